use serde::{Deserialize, Serialize};

/// Lo que un tick le informa al scheduler.
///
/// No terminales: `InProgress`, `InProgressContinue` (volver a tickear).
/// Terminales: `Succeeded`, `Failed`, `Cancelled`, `SystemCancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    /// Trabajo en curso; tickear de nuevo en el intervalo normal.
    InProgress,
    /// Trabajo en curso; tickear pronto, sin extender el deadline por defecto.
    InProgressContinue,
    Succeeded,
    Failed,
    /// Cancelado a pedido de un usuario.
    Cancelled,
    /// Cancelado por la plataforma (apagado, experimento desmontado).
    SystemCancelled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::InProgress | StepStatus::InProgressContinue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_partition() {
        assert!(!StepStatus::InProgress.is_terminal());
        assert!(!StepStatus::InProgressContinue.is_terminal());
        for s in [StepStatus::Succeeded, StepStatus::Failed, StepStatus::Cancelled, StepStatus::SystemCancelled] {
            assert!(s.is_terminal(), "{s:?}");
        }
    }
}
