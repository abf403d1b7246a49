//! branchflow-rust
//!
//! Paquete raíz del workspace: configuración de la aplicación, errores de
//! nivel aplicación y los workflows de ejemplo que usa la demo (`main.rs`).
//! La máquina de estados vive en `branch-core`; Postgres en
//! `branch-persistence`.

pub mod config;
pub mod errors;
pub mod workflows;
