use crate::analyzer::DEFAULT_FAILURE_RATE;
use crate::options::AnalysisOptions;
use anyhow::{anyhow, Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this crowd analytics instance
    pub node_id: String,

    /// Probability of an injected failure in demo mode
    pub failure_rate: f64,

    /// Options for cache-aware media analyses
    pub options: AnalysisOptions,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            env::var("CROWD_SERVICE_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".to_string());

        let node_id = env::var("NODE_ID").unwrap_or_else(|_| {
            format!(
                "crowd-analytics-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let failure_rate = parse_failure_rate(env::var("DEMO_FAILURE_RATE").ok().as_deref())?;

        let mut options = AnalysisOptions::default();
        options
            .apply_env_overrides()
            .context("Invalid CROWD_* analysis option")?;

        Ok(Self {
            bind_addr,
            node_id,
            failure_rate,
            options,
        })
    }
}

fn parse_failure_rate(raw: Option<&str>) -> Result<f64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_FAILURE_RATE);
    };
    let rate: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid DEMO_FAILURE_RATE '{}'", raw))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(anyhow!("DEMO_FAILURE_RATE must be within [0, 1], got {}", rate));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_rate_default() {
        assert_eq!(parse_failure_rate(None).unwrap(), 0.02);
    }

    #[test]
    fn test_failure_rate_parsing() {
        assert_eq!(parse_failure_rate(Some(" 0.5 ")).unwrap(), 0.5);
        assert_eq!(parse_failure_rate(Some("0")).unwrap(), 0.0);
        assert!(parse_failure_rate(Some("1.5")).is_err());
        assert!(parse_failure_rate(Some("often")).is_err());
        assert!(parse_failure_rate(Some("NaN")).is_err());
    }
}
