// Loading of harness input files. Every file is read through the filesystem abstraction so that
// the decoding rules can be tested without touching the disk.

use std::path::Path;

use tracing::{debug, warn};

use crate::pal::Filesystem;
use crate::{
    DecodeError, MachineInfo, Recording, SetupError, WorkloadRequest, WorkloadSpec, parse_template,
};

fn read(fs: &impl Filesystem, path: &Path) -> Result<String, SetupError> {
    fs.read_to_string(path).map_err(|source| SetupError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn decode_error(path: &Path, source: impl Into<DecodeError>) -> SetupError {
    SetupError::Decode {
        path: path.to_path_buf(),
        source: source.into(),
    }
}

pub(crate) fn load_machine_info(
    fs: &impl Filesystem,
    path: &Path,
) -> Result<MachineInfo, SetupError> {
    let text = read(fs, path)?;

    MachineInfo::from_json(&text).map_err(|e| decode_error(path, e))
}

pub(crate) fn load_recording(fs: &impl Filesystem, path: &Path) -> Result<Recording, SetupError> {
    let text = read(fs, path)?;

    let recording = Recording::from_toml(&text).map_err(|e| decode_error(path, e))?;
    debug!(path = %path.display(), allocations = recording.len(), "loaded recording");

    Ok(recording)
}

/// Loads a workload file. Files with the `toml` extension are TOML, anything else is JSON.
pub(crate) fn load_workload(
    fs: &impl Filesystem,
    path: &Path,
) -> Result<WorkloadRequest, SetupError> {
    let text = read(fs, path)?;

    let is_toml = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("toml"));

    let spec: WorkloadSpec = if is_toml {
        toml::from_str(&text).map_err(|e| decode_error(path, e))?
    } else {
        serde_json::from_str(&text).map_err(|e| decode_error(path, e))?
    };

    spec.into_request().map_err(|source| SetupError::Workload {
        workload: path.display().to_string(),
        source,
    })
}

/// Turns `name=request/limit` templates into requests, skipping (with a warning) any argument
/// that is not a template.
pub(crate) fn expand_templates(templates: &[String]) -> Result<Vec<WorkloadRequest>, SetupError> {
    let mut requests = Vec::with_capacity(templates.len());

    for template in templates {
        match parse_template(template) {
            Ok(Some(request)) => requests.push(request),
            Ok(None) => warn!(
                template = template.as_str(),
                "skipping argument that is not a name=request/limit template"
            ),
            Err(source) => {
                return Err(SetupError::Workload {
                    workload: template.clone(),
                    source,
                });
            }
        }
    }

    Ok(requests)
}
