use std::fmt::{self, Display};
use std::str::FromStr;

use serde::Deserialize;

/// An amount of CPU time in the Kubernetes resource notation, stored as millicores.
///
/// Accepted forms are whole CPUs (`2`), decimal CPUs with up to three fractional digits (`1.5`)
/// and millicores (`500m`).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CpuQuantity {
    millis: u64,
}

impl CpuQuantity {
    const MILLIS_PER_CPU: u64 = 1000;

    /// Creates a quantity of `millis` millicores.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    /// Creates a quantity of `cpus` whole CPUs, saturating on overflow.
    #[must_use]
    pub const fn from_cpus(cpus: u64) -> Self {
        Self {
            millis: cpus.saturating_mul(Self::MILLIS_PER_CPU),
        }
    }

    /// The quantity in millicores.
    #[must_use]
    pub const fn millis(self) -> u64 {
        self.millis
    }

    /// The number of whole CPUs, if the quantity has no fractional part.
    #[must_use]
    pub fn whole_cpus(self) -> Option<u64> {
        (self.millis.checked_rem(Self::MILLIS_PER_CPU) == Some(0))
            .then(|| self.millis.checked_div(Self::MILLIS_PER_CPU))
            .flatten()
    }
}

impl FromStr for CpuQuantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let invalid = |problem: &str| QuantityError {
            value: value.to_string(),
            problem: problem.to_string(),
        };

        if let Some(millis) = value.strip_suffix('m') {
            return millis
                .parse::<u64>()
                .map(Self::from_millis)
                .map_err(|_| invalid("millicores must be a non-negative integer"));
        }

        let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("quantity is empty"));
        }

        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid(
                "expected whole CPUs, decimal CPUs or millicores such as '500m'",
            ));
        }

        if fraction.len() > 3 {
            return Err(invalid("at most three fractional digits are supported"));
        }

        let whole_cpus = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .map_err(|_| invalid("quantity is too large"))?
        };

        // Right-pad the fraction to three digits, so "5" means 500 millicores.
        let fraction_millis = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<3}")
                .parse::<u64>()
                .map_err(|_| invalid("invalid fractional part"))?
        };

        whole_cpus
            .checked_mul(Self::MILLIS_PER_CPU)
            .and_then(|millis| millis.checked_add(fraction_millis))
            .map(Self::from_millis)
            .ok_or_else(|| invalid("quantity is too large"))
    }
}

/// Renders whole CPUs bare and anything else in millicores, e.g. `2` or `1500m`.
impl Display for CpuQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.whole_cpus() {
            Some(cpus) => write!(f, "{cpus}"),
            None => write!(f, "{}m", self.millis),
        }
    }
}

/// A CPU quantity could not be parsed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid CPU quantity '{value}': {problem}")]
pub struct QuantityError {
    value: String,
    problem: String,
}

impl QuantityError {
    /// The text that failed to parse.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A request for CPU resources on behalf of one container of one tenant.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct WorkloadRequest {
    /// The tenant (pod) the request belongs to.
    pub tenant: String,

    /// The container within the tenant that will use the CPUs.
    pub container: String,

    /// CPU time the container is guaranteed.
    pub cpu_request: CpuQuantity,

    /// CPU time the container may use at most.
    pub cpu_limit: CpuQuantity,
}

impl WorkloadRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        tenant: impl Into<String>,
        container: impl Into<String>,
        cpu_request: CpuQuantity,
        cpu_limit: CpuQuantity,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            container: container.into(),
            cpu_request,
            cpu_limit,
        }
    }

    /// The number of CPUs the container should get for its exclusive use.
    ///
    /// This is `Some` only if the request equals the limit and is a non-zero whole number of CPUs.
    /// Any other request is served from the shared pool.
    #[must_use]
    pub fn exclusive_cpus(&self) -> Option<usize> {
        if self.cpu_request != self.cpu_limit {
            return None;
        }

        self.cpu_request
            .whole_cpus()
            .filter(|cpus| *cpus > 0)
            .and_then(|cpus| usize::try_from(cpus).ok())
    }
}

impl Display for WorkloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} (cpu {}/{})",
            self.tenant, self.container, self.cpu_request, self.cpu_limit
        )
    }
}

/// Parses a workload template of the form `name=request/limit`, e.g. `web=2/2`.
///
/// The template yields tenant `<name>-pod` with container `<name>-cnt`. Returns `Ok(None)` if the
/// text does not have the template shape at all, so callers can skip it.
///
/// # Errors
///
/// Returns [`QuantityError`] if the text has the template shape but a quantity is invalid.
pub fn parse_template(template: &str) -> Result<Option<WorkloadRequest>, QuantityError> {
    if template.chars().any(char::is_whitespace) {
        return Ok(None);
    }

    let Some((name, quantities)) = template.rsplit_once('=') else {
        return Ok(None);
    };
    let Some((request, limit)) = quantities.rsplit_once('/') else {
        return Ok(None);
    };

    Ok(Some(WorkloadRequest::new(
        format!("{name}-pod"),
        format!("{name}-cnt"),
        request.parse()?,
        limit.parse()?,
    )))
}

/// A quantity as written in a workload file: either a string in resource notation or a bare
/// number of whole CPUs.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
enum QuantityText {
    Cpus(u64),
    Text(String),
}

impl QuantityText {
    fn to_quantity(&self) -> Result<CpuQuantity, QuantityError> {
        match self {
            Self::Cpus(cpus) => Ok(CpuQuantity::from_cpus(*cpus)),
            Self::Text(text) => text.parse(),
        }
    }
}

/// The on-disk description of a workload, as found in TOML or JSON workload files.
///
/// ```toml
/// name = "web"
/// container = "server"   # optional, defaults to "<name>-cnt"
/// cpu_request = "2"
/// cpu_limit = "2"        # optional, defaults to the request
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkloadSpec {
    name: String,

    #[serde(default)]
    container: Option<String>,

    cpu_request: QuantityText,

    #[serde(default)]
    cpu_limit: Option<QuantityText>,
}

impl WorkloadSpec {
    /// Turns the description into a request for tenant `<name>-pod`.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError`] if a quantity is invalid.
    pub fn into_request(self) -> Result<WorkloadRequest, QuantityError> {
        let cpu_request = self.cpu_request.to_quantity()?;
        let cpu_limit = match &self.cpu_limit {
            Some(limit) => limit.to_quantity()?,
            None => cpu_request,
        };

        let container = self
            .container
            .unwrap_or_else(|| format!("{}-cnt", self.name));

        Ok(WorkloadRequest::new(
            format!("{}-pod", self.name),
            container,
            cpu_request,
            cpu_limit,
        ))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(QuantityError: Send, Sync, std::error::Error);

    #[test]
    fn quantity_forms() {
        let cases = [
            ("2", 2000),
            ("0", 0),
            ("1.5", 1500),
            ("0.25", 250),
            (".5", 500),
            ("3.", 3000),
            ("500m", 500),
            ("2000m", 2000),
            (" 4 ", 4000),
        ];

        for (text, millis) in cases {
            assert_eq!(
                text.parse::<CpuQuantity>().unwrap().millis(),
                millis,
                "'{text}'"
            );
        }
    }

    #[test]
    fn invalid_quantities() {
        for text in ["", ".", "-1", "1.2345", "two", "1.5m", "m", "1e3", "99999999999999999999"] {
            let error = text.parse::<CpuQuantity>().unwrap_err();

            assert_eq!(error.value(), text.trim(), "'{text}'");
        }
    }

    #[test]
    fn quantity_display() {
        assert_eq!(CpuQuantity::from_cpus(3).to_string(), "3");
        assert_eq!(CpuQuantity::from_millis(1500).to_string(), "1500m");
        assert_eq!(CpuQuantity::from_millis(2000).to_string(), "2");
    }

    #[test]
    fn whole_cpus() {
        assert_eq!(CpuQuantity::from_millis(4000).whole_cpus(), Some(4));
        assert_eq!(CpuQuantity::from_millis(4001).whole_cpus(), None);
    }

    #[test]
    fn exclusive_requires_equal_whole_quantities() {
        let request = |req: &str, limit: &str| {
            WorkloadRequest::new("t", "c", req.parse().unwrap(), limit.parse().unwrap())
        };

        assert_eq!(request("2", "2").exclusive_cpus(), Some(2));
        assert_eq!(request("2000m", "2").exclusive_cpus(), Some(2));
        assert_eq!(request("1", "2").exclusive_cpus(), None);
        assert_eq!(request("1.5", "1.5").exclusive_cpus(), None);
        assert_eq!(request("0", "0").exclusive_cpus(), None);
    }

    #[test]
    fn template_yields_pod_and_container() {
        let request = parse_template("web=2/4").unwrap().unwrap();

        assert_eq!(request.tenant, "web-pod");
        assert_eq!(request.container, "web-cnt");
        assert_eq!(request.cpu_request, CpuQuantity::from_cpus(2));
        assert_eq!(request.cpu_limit, CpuQuantity::from_cpus(4));
        assert_eq!(request.to_string(), "web-pod/web-cnt (cpu 2/4)");
    }

    #[test]
    fn non_template_is_skipped() {
        for text in ["web", "web=2", "web 2/2", "web=2/2 ", "2/2"] {
            assert_eq!(parse_template(text).unwrap(), None, "'{text}'");
        }
    }

    #[test]
    fn template_with_bad_quantity_fails() {
        let error = parse_template("web=two/2").unwrap_err();

        assert_eq!(error.value(), "two");
    }

    #[test]
    fn spec_defaults() {
        let spec: WorkloadSpec = toml::from_str("name = \"db\"\ncpu_request = 3\n").unwrap();
        let request = spec.into_request().unwrap();

        assert_eq!(request.tenant, "db-pod");
        assert_eq!(request.container, "db-cnt");
        assert_eq!(request.cpu_limit, CpuQuantity::from_cpus(3));
        assert_eq!(request.exclusive_cpus(), Some(3));
    }

    #[test]
    fn spec_explicit_fields() {
        let spec: WorkloadSpec = serde_json::from_str(
            r#"{"name":"db","container":"engine","cpu_request":"500m","cpu_limit":"1"}"#,
        )
        .unwrap();
        let request = spec.into_request().unwrap();

        assert_eq!(request.container, "engine");
        assert_eq!(request.cpu_request, CpuQuantity::from_millis(500));
        assert_eq!(request.exclusive_cpus(), None);
    }

    #[test]
    fn spec_rejects_unknown_fields() {
        toml::from_str::<WorkloadSpec>("name = \"db\"\ncpu_request = 1\nmemory = \"1Gi\"\n")
            .unwrap_err();
    }
}
