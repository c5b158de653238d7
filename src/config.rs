//! Carga de la configuración de conexión a Neo4j desde el entorno.

use std::env;

use crate::error::StoreError;

pub const NEO4J_URI_VAR: &str = "NEO4J_URI";
pub const NEO4J_NAME_VAR: &str = "NEO4J_NAME";
pub const NEO4J_PASSWORD_VAR: &str = "NEO4J_PASSWORD";

/// Parámetros de conexión al almacén de grafos. Los tres son obligatorios.
#[derive(Clone)]
pub struct StoreConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("neo4j_uri", &self.neo4j_uri)
            .field("neo4j_user", &self.neo4j_user)
            .field("neo4j_password", &"***")
            .finish()
    }
}

impl StoreConfig {
    /// Carga la configuración desde variables de entorno (el `.env`, si
    /// existe, ya debe estar cargado).
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_vars<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| lookup(key).ok_or(StoreError::MissingConfig(key));

        Ok(Self {
            neo4j_uri: require(NEO4J_URI_VAR)?,
            neo4j_user: require(NEO4J_NAME_VAR)?,
            neo4j_password: require(NEO4J_PASSWORD_VAR)?,
        })
    }
}
