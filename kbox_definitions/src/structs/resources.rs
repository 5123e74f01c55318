use super::Verify;
use crate::Result;

/// A single cpu/memory pair, using Kubernetes' own shorthand strings
/// (`100m`, `256Mi`, ...) rather than a parsed numeric type, so the
/// renderer can pass them straight through into the container spec
/// unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ResourceAmounts {
    pub cpu: String,
    pub memory: String,
}

/// Kubernetes-shaped resource requests/limits for a container.
///
/// Either side may be omitted; the renderer fills in `{128Mi/100m request,
/// 256Mi/200m limit}` when both are absent, and defaults a missing `limits`
/// to 2x the given `requests` for each of cpu/memory.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceAmounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceAmounts>,
}

impl Verify for ResourceRequirements {
    /// Request must not exceed limit, for each of cpu and memory, when both
    /// are given.
    fn verify(&self) -> Result<()> {
        if let (Some(req), Some(lim)) = (&self.requests, &self.limits) {
            let reqcpu = parse_cpu(&req.cpu)?;
            let limcpu = parse_cpu(&lim.cpu)?;
            if reqcpu > limcpu {
                bail!(
                    "cpu request ({}) exceeds cpu limit ({})",
                    req.cpu,
                    lim.cpu
                );
            }
            let reqmem = parse_memory(&req.memory)?;
            let limmem = parse_memory(&lim.memory)?;
            if reqmem > limmem {
                bail!(
                    "memory request ({}) exceeds memory limit ({})",
                    req.memory,
                    lim.memory
                );
            }
        }
        if let Some(req) = &self.requests {
            parse_cpu(&req.cpu)?;
            parse_memory(&req.memory)?;
        }
        if let Some(lim) = &self.limits {
            parse_cpu(&lim.cpu)?;
            parse_memory(&lim.memory)?;
        }
        Ok(())
    }
}

/// Parse a Kubernetes memory quantity (`Ki`/`Mi`/`Gi`/`k`/`M`/`G` suffixes,
/// or bare bytes) into a byte count.
pub fn parse_memory(s: &str) -> Result<f64> {
    let digits = s.chars().take_while(|ch| ch.is_digit(10) || *ch == '.').collect::<String>();
    let unit = s.chars().skip_while(|ch| ch.is_digit(10) || *ch == '.').collect::<String>();
    let mut res: f64 = digits.parse()?;
    if unit == "Ki" {
        res *= 1024.0;
    } else if unit == "Mi" {
        res *= 1024.0 * 1024.0;
    } else if unit == "Gi" {
        res *= 1024.0 * 1024.0 * 1024.0;
    } else if unit == "k" {
        res *= 1000.0;
    } else if unit == "M" {
        res *= 1000.0 * 1000.0;
    } else if unit == "G" {
        res *= 1000.0 * 1000.0 * 1000.0;
    } else if !unit.is_empty() {
        bail!("unknown memory unit '{}' in '{}'", unit, s);
    }
    Ok(res)
}

/// Parse a Kubernetes cpu quantity (`100m`, `1`, `2.5`) into whole cores.
pub fn parse_cpu(s: &str) -> Result<f64> {
    let digits = s.chars().take_while(|ch| ch.is_digit(10) || *ch == '.').collect::<String>();
    let unit = s.chars().skip_while(|ch| ch.is_digit(10) || *ch == '.').collect::<String>();
    let mut res: f64 = digits.parse()?;
    if unit == "m" {
        res /= 1000.0;
    } else if !unit.is_empty() {
        bail!("unknown cpu unit '{}' in '{}'", unit, s);
    }
    Ok(res)
}

/// Double a resource quantity string for the implicit `limits = 2x
/// requests` default. Carries the unit suffix through
/// untouched so `100m` -> `200m` rather than `0.2`.
pub fn double_quantity(s: &str) -> String {
    let digits = s.chars().take_while(|ch| ch.is_digit(10) || *ch == '.').collect::<String>();
    let unit: String = s.chars().skip_while(|ch| ch.is_digit(10) || *ch == '.').collect();
    match digits.parse::<f64>() {
        Ok(n) => {
            let doubled = n * 2.0;
            if doubled.fract() == 0.0 {
                format!("{}{}", doubled as i64, unit)
            } else {
                format!("{}{}", doubled, unit)
            }
        }
        Err(_) => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_units() {
        assert_eq!(parse_memory("512Mi").unwrap(), 512.0 * 1024.0 * 1024.0);
        assert_eq!(parse_memory("1Gi").unwrap(), 1024.0 * 1024.0 * 1024.0);
    }

    #[test]
    fn cpu_units() {
        assert_eq!(parse_cpu("100m").unwrap(), 0.1);
        assert_eq!(parse_cpu("2").unwrap(), 2.0);
    }

    #[test]
    fn request_exceeding_limit_fails() {
        let r = ResourceRequirements {
            requests: Some(ResourceAmounts { cpu: "100m".into(), memory: "512Mi".into() }),
            limits: Some(ResourceAmounts { cpu: "100m".into(), memory: "128Mi".into() }),
        };
        assert!(r.verify().is_err());
    }

    #[test]
    fn doubling_keeps_unit() {
        assert_eq!(double_quantity("100m"), "200m");
        assert_eq!(double_quantity("128Mi"), "256Mi");
    }
}
