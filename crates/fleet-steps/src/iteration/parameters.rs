use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use fleet_core::constants::{DEFAULT_ITERATION_TIMEOUT, DEFAULT_MAX_CONSECUTIVE_FAILURES};
use fleet_core::{StepError, StepParameters};

use super::disk_sku::DEFAULT_OS_DISK_SKU;

pub const REGIONS: &str = "Regions";
pub const USE_TIP_SESSION: &str = "UseTipSession";
pub const TIP_SESSION_ID: &str = "TipSessionId";
pub const VM_SKU: &str = "VmSku";
pub const VM_SKUS: &str = "VmSkus";
pub const VM_COUNT: &str = "VmCount";
pub const OS_DISK_SKU: &str = "OsDiskSku";
pub const ITERATIONS: &str = "Iterations";
pub const MAXIMUM_CONSECUTIVE_FAILURE: &str = "MaximumConsecutiveFailure";
pub const ITERATION_TIMEOUT: &str = "IterationTimeout";
pub const RESOURCE_GROUP_PREFIX: &str = "ResourceGroupPrefix";
pub const TAGS: &str = "Tags";
pub const SPECIFICATION_PATH: &str = "SpecificationPath";

pub const DEFAULT_RESOURCE_GROUP_PREFIX: &str = "fleet-rg";

/// De dónde sale la región destino (y quizás el cluster).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Regions(Vec<String>),
    ReservedSession(String),
}

/// Vista tipada y validada de los parámetros del step de iteración.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationParameters {
    pub placement: Placement,
    pub vm_sku: Option<String>,
    pub vm_skus: Vec<String>,
    pub vm_count: u32,
    pub os_disk_sku: String,
    pub iterations: u32,
    pub maximum_consecutive_failure: u32,
    pub iteration_timeout: Duration,
    pub resource_group_prefix: String,
    pub tags: BTreeMap<String, String>,
    pub specification_path: Option<PathBuf>,
}

impl IterationParameters {
    pub fn from_parameters(parameters: &StepParameters) -> Result<Self, StepError> {
        let regions = parameters.get_list(REGIONS)?;
        let use_session = parameters.get_bool(USE_TIP_SESSION)?.unwrap_or(false);
        let placement = match (regions.is_empty(), use_session) {
            (false, false) => Placement::Regions(regions),
            (true, true) => Placement::ReservedSession(parameters.require_string(TIP_SESSION_ID)?),
            (false, true) => {
                return Err(StepError::Configuration(format!("'{REGIONS}' and '{USE_TIP_SESSION}' are mutually exclusive")))
            }
            (true, false) => {
                return Err(StepError::Configuration(format!("one of '{REGIONS}' or '{USE_TIP_SESSION}' is required")))
            }
        };

        let vm_sku = parameters.get_string(VM_SKU)?;
        let vm_skus = parameters.get_list(VM_SKUS)?;
        if matches!(placement, Placement::Regions(_)) && vm_sku.is_none() && vm_skus.is_empty() {
            return Err(StepError::Configuration(format!("'{VM_SKU}' or '{VM_SKUS}' is required without a reserved session")));
        }

        let iterations = parameters.get_u32(ITERATIONS)?
                                   .ok_or_else(|| StepError::MissingParameter(ITERATIONS.to_string()))?;
        let vm_count = parameters.get_u32(VM_COUNT)?.unwrap_or(1);
        let maximum_consecutive_failure =
            parameters.get_u32(MAXIMUM_CONSECUTIVE_FAILURE)?.unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES);
        for (name, value) in [(ITERATIONS, iterations),
                              (VM_COUNT, vm_count),
                              (MAXIMUM_CONSECUTIVE_FAILURE, maximum_consecutive_failure)]
        {
            if value == 0 {
                return Err(StepError::invalid_parameter(name, "must be at least 1"));
            }
        }

        Ok(Self { placement,
                  vm_sku,
                  vm_skus,
                  vm_count,
                  os_disk_sku: parameters.get_string(OS_DISK_SKU)?
                                         .unwrap_or_else(|| DEFAULT_OS_DISK_SKU.to_string()),
                  iterations,
                  maximum_consecutive_failure,
                  iteration_timeout: parameters.get_duration(ITERATION_TIMEOUT)?.unwrap_or(DEFAULT_ITERATION_TIMEOUT),
                  resource_group_prefix: parameters.get_string(RESOURCE_GROUP_PREFIX)?
                                                   .unwrap_or_else(|| DEFAULT_RESOURCE_GROUP_PREFIX.to_string()),
                  tags: parameters.get_string_map(TAGS)?,
                  specification_path: parameters.get_string(SPECIFICATION_PATH)?.map(PathBuf::from) })
    }

    pub fn uses_reserved_session(&self) -> bool {
        matches!(self.placement, Placement::ReservedSession(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::ErrorKind;
    use serde_json::json;

    #[test]
    fn regions_and_session_are_mutually_exclusive() {
        let both = StepParameters::new().with("Regions", "westus2,eastus")
                                        .with("UseTipSession", true)
                                        .with("TipSessionId", "s-1")
                                        .with("Iterations", 3);
        let err = IterationParameters::from_parameters(&both).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let neither = StepParameters::new().with("VmSku", "Standard_D2s_v5").with("Iterations", 3);
        assert!(matches!(IterationParameters::from_parameters(&neither), Err(StepError::Configuration(_))));
    }

    #[test]
    fn defaults_and_lists() {
        let p = StepParameters::new().with("regions", json!(["westus2", "eastus"]))
                                     .with("VmSkus", "Standard_D2s_v5; Standard_D4s_v5")
                                     .with("Iterations", "4")
                                     .with("Tags", json!({ "team": "perf" }));
        let p = IterationParameters::from_parameters(&p).unwrap();
        assert_eq!(p.placement, Placement::Regions(vec!["westus2".into(), "eastus".into()]));
        assert_eq!(p.vm_skus.len(), 2);
        assert_eq!(p.vm_count, 1);
        assert_eq!(p.os_disk_sku, "Standard_LRS");
        assert_eq!(p.maximum_consecutive_failure, 5);
        assert_eq!(p.iteration_timeout, Duration::from_secs(3600));
        assert_eq!(p.resource_group_prefix, "fleet-rg");
        assert_eq!(p.tags.get("team").map(String::as_str), Some("perf"));
    }

    #[test]
    fn session_requires_an_id_and_no_sku() {
        let p = StepParameters::new().with("UseTipSession", "true").with("Iterations", 1);
        assert_eq!(IterationParameters::from_parameters(&p).unwrap_err(),
                   StepError::MissingParameter("TipSessionId".into()));
        let p = p.with("TipSessionId", "s-1");
        assert!(IterationParameters::from_parameters(&p).unwrap().uses_reserved_session());
    }

    #[test]
    fn iterations_must_be_positive() {
        let p = StepParameters::new().with("Regions", "westus2")
                                     .with("VmSku", "Standard_D2s_v5")
                                     .with("Iterations", 0);
        assert!(matches!(IterationParameters::from_parameters(&p), Err(StepError::InvalidParameter { .. })));
    }
}
