//! Constantes del motor.
//!
//! Los valores por defecto de expiración replican los de la configuración
//! clásica de FireWorks: 14 días para reservas, 4 días sin heartbeat para
//! considerar una ejecución como FIZZLED y 60 segundos entre pasadas de
//! mantenimiento.

/// Segundos tras los cuales una reserva sin `start` se considera abandonada.
pub const DEFAULT_RESERVATION_EXPIRATION_SECS: u64 = 60 * 60 * 24 * 14;

/// Segundos sin heartbeat tras los cuales un launch RUNNING se da por muerto.
pub const DEFAULT_RUN_EXPIRATION_SECS: u64 = 60 * 60 * 24 * 4;

/// Pausa por defecto entre iteraciones de `maintain(infinite = true)`.
pub const DEFAULT_MAINTAIN_INTERVAL_SECS: u64 = 60;

/// Tope de cualquier expiración configurable (100 años).
pub const MAX_EXPIRATION_SECS: u64 = 60 * 60 * 24 * 365 * 100;

/// Formato de la contraseña de `reset` (fecha UTC del día).
pub const RESET_DATE_FORMAT: &str = "%Y-%m-%d";

/// Razón registrada en el launch cuando el mantenimiento lo marca FIZZLED.
pub const FIZZLE_REASON_NO_HEARTBEAT: &str = "no heartbeat";

/// Intentos de compare-and-set antes de rendirse ante contención sostenida.
pub const MAX_CAS_ATTEMPTS: usize = 16;
