//! Arma la especificación del resource group de una iteración.
//!
//! Las elecciones son aleatorias pero reproducibles: el RNG se siembra con la
//! semilla del experimento y el número de iteración, así un experimento
//! reintentado elige las mismas regiones y SKUs en el mismo orden.

use fleet_core::hashing::deterministic_seed;
use fleet_core::{StepContext, StepError};
use fleet_providers::{ReservedSession, ResourceGroupSpec};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::disk_sku::effective_disk_sku;
use super::parameters::{IterationParameters, Placement};

pub fn iteration_rng(context: &StepContext, iteration: u32) -> StdRng {
    let seed = (u64::from(deterministic_seed(&context.experiment_id)) << 32) | u64::from(iteration);
    StdRng::seed_from_u64(seed)
}

/// `{prefix}-{primeros 8 dígitos hex del experimento}-{iteration:03}`.
pub fn resource_group_name(prefix: &str, context: &StepContext, iteration: u32) -> String {
    let experiment = context.experiment_id.simple().to_string();
    format!("{prefix}-{}-{iteration:03}", &experiment[..8])
}

/// Región tomada de una copia mezclada de la lista configurada.
pub fn choose_region(regions: &[String], rng: &mut StdRng) -> Option<String> {
    let mut shuffled = regions.to_vec();
    shuffled.shuffle(rng);
    shuffled.into_iter().next()
}

/// SKU de VM para la iteración.
///
/// - Un `VmSku` explícito siempre gana.
/// - Con sesión: los SKUs permitidos intersectados con los soportados por la
///   sesión, uno elegido de forma uniforme. Sin lista permitida se usa el SKU
///   preferido de la sesión (si lo soporta) o cualquiera soportado. Una
///   intersección vacía es error de configuración.
/// - Sin sesión: uno de los SKUs permitidos.
pub fn choose_vm_sku(parameters: &IterationParameters,
                     session: Option<&ReservedSession>,
                     rng: &mut StdRng)
                     -> Result<String, StepError> {
    if let Some(sku) = &parameters.vm_sku {
        return Ok(sku.clone());
    }
    let Some(session) = session else {
        return parameters.vm_skus
                         .choose(rng)
                         .cloned()
                         .ok_or_else(|| StepError::Configuration("no VM SKU configured".into()));
    };

    let supported = |sku: &String| session.supported_skus.iter().any(|s| s.eq_ignore_ascii_case(sku));
    if parameters.vm_skus.is_empty() {
        if let Some(preferred) = session.preferred_sku.as_ref().filter(|p| supported(*p)) {
            return Ok(preferred.clone());
        }
        return session.supported_skus
                      .choose(rng)
                      .cloned()
                      .ok_or_else(|| StepError::Configuration(format!("session '{}' supports no VM SKU", session.id)));
    }

    let candidates: Vec<&String> = parameters.vm_skus.iter().filter(|sku| supported(*sku)).collect();
    candidates.choose(rng).map(|sku| (*sku).clone()).ok_or_else(|| {
        StepError::Configuration(format!("none of the allowed VM SKUs [{}] is supported by session '{}' ([{}])",
                                         parameters.vm_skus.join(", "),
                                         session.id,
                                         session.supported_skus.join(", ")))
    })
}

pub fn build_spec(parameters: &IterationParameters,
                  context: &StepContext,
                  iteration: u32,
                  session: Option<&ReservedSession>)
                  -> Result<ResourceGroupSpec, StepError> {
    let mut rng = iteration_rng(context, iteration);
    let (region, cluster_name) = match (&parameters.placement, session) {
        (Placement::Regions(regions), _) => {
            let region = choose_region(regions, &mut rng).ok_or_else(|| StepError::Configuration("no region configured".into()))?;
            (region, None)
        }
        (Placement::ReservedSession(_), Some(session)) => (session.region.clone(), Some(session.cluster_name.clone())),
        (Placement::ReservedSession(id), None) => {
            return Err(StepError::Internal(format!("reserved session '{id}' was not looked up")));
        }
    };
    let vm_sku = choose_vm_sku(parameters, session, &mut rng)?;

    let mut tags = parameters.tags.clone();
    tags.insert("experimentId".into(), context.experiment_id.to_string());
    tags.insert("stepId".into(), context.step_id.clone());
    tags.insert("iteration".into(), iteration.to_string());

    Ok(ResourceGroupSpec { name: resource_group_name(&parameters.resource_group_prefix, context, iteration),
                           region,
                           os_disk_sku: effective_disk_sku(&parameters.os_disk_sku, &vm_sku),
                           vm_sku,
                           vm_count: parameters.vm_count,
                           cluster_name,
                           tags })
}
