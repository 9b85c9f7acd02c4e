//! Configuración del motor.
//!
//! Valores planos que el cargador externo (ver `fw-persistence::config`)
//! construye y pasa a `LaunchPad::new`. El core nunca lee variables de
//! entorno.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAINTAIN_INTERVAL_SECS, DEFAULT_RESERVATION_EXPIRATION_SECS, DEFAULT_RUN_EXPIRATION_SECS,
                       MAX_EXPIRATION_SECS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPadConfig {
    /// Vida de una reserva sin `start` antes de que el mantenimiento la recupere.
    pub reservation_expiration_secs: u64,
    /// Tiempo máximo sin heartbeat para un launch RUNNING.
    pub run_expiration_secs: u64,
    /// Pausa entre iteraciones de `maintain` en modo infinito.
    pub maintain_interval_secs: u64,
}

impl Default for LaunchPadConfig {
    fn default() -> Self {
        Self { reservation_expiration_secs: DEFAULT_RESERVATION_EXPIRATION_SECS,
               run_expiration_secs: DEFAULT_RUN_EXPIRATION_SECS,
               maintain_interval_secs: DEFAULT_MAINTAIN_INTERVAL_SECS }
    }
}

impl LaunchPadConfig {
    pub fn reservation_expiration(&self) -> Duration {
        secs_to_duration(self.reservation_expiration_secs)
    }

    pub fn run_expiration(&self) -> Duration {
        secs_to_duration(self.run_expiration_secs)
    }

    pub fn maintain_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.maintain_interval_secs)
    }
}

/// Convierte segundos a `chrono::Duration`, acotando a `MAX_EXPIRATION_SECS`.
pub fn secs_to_duration(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_EXPIRATION_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_expirations_are_clamped() {
        assert_eq!(secs_to_duration(u64::MAX), Duration::seconds(MAX_EXPIRATION_SECS as i64));
        assert_eq!(secs_to_duration(5), Duration::seconds(5));
    }
}
