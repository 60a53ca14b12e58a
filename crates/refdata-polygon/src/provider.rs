//! Wiring of the engines into one provider.

use std::sync::Arc;

use refdata_core::{FactorProvider, Result, UsEquityCalendar};

use crate::client::{PolygonRestClient, RestGateway};
use crate::config::PolygonConfig;
use crate::factor_files::FactorFileEngine;
use crate::fundamentals::Fundamentals;
use crate::map_files::MapFileEngine;
use crate::universe::UniverseEngine;

/// The assembled Polygon provider: one gateway, one data root, the three
/// engines and the fundamentals service sharing both.
pub struct PolygonProvider {
    /// Factor-file materialization.
    pub factor_files: Arc<FactorFileEngine>,
    /// Map-file materialization.
    pub map_files: Arc<MapFileEngine>,
    /// Coarse universe generation and lookups.
    pub universe: Arc<UniverseEngine>,
    /// Point-in-time fundamental lookups.
    pub fundamentals: Arc<Fundamentals>,
}

impl PolygonProvider {
    /// Builds the provider from configuration, constructing the production
    /// REST client.
    ///
    /// # Errors
    /// Returns [`refdata_core::RefDataError::Config`] when the configuration
    /// is invalid; this is the only error the provider surfaces.
    pub fn from_config(config: &PolygonConfig) -> Result<Self> {
        config.validate()?;
        let gateway: Arc<dyn RestGateway> =
            Arc::new(PolygonRestClient::new(config.api_key.clone()));
        Self::with_gateway(gateway, config)
    }

    /// Builds the provider over an explicit gateway (tests pass stubs).
    pub fn with_gateway(gateway: Arc<dyn RestGateway>, config: &PolygonConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = config.data_dir.clone();

        let factor_files = Arc::new(FactorFileEngine::new(
            Arc::clone(&gateway),
            Arc::new(UsEquityCalendar),
            data_dir.clone(),
        ));
        let map_files = Arc::new(MapFileEngine::with_local_resolver(
            Arc::clone(&gateway),
            data_dir.clone(),
        ));
        let fundamentals = Arc::new(Fundamentals::new(
            Arc::clone(&gateway),
            data_dir.clone(),
            config.financials_cache_hours,
            config.live_mode,
        ));
        let universe = Arc::new(UniverseEngine::new(
            gateway,
            Arc::clone(&factor_files) as Arc<dyn FactorProvider>,
            Arc::clone(&fundamentals),
            data_dir,
            config.coarse_max_concurrent,
        ));

        Ok(Self {
            factor_files,
            map_files,
            universe,
            fundamentals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubGateway;
    use refdata_core::{RefDataError, Symbol};

    #[tokio::test]
    async fn invalid_config_is_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = PolygonConfig::new("", dir.path());
        let gateway = Arc::new(StubGateway::new());
        assert!(matches!(
            PolygonProvider::with_gateway(gateway, &config).map(|_| ()),
            Err(RefDataError::Config(_))
        ));
    }

    #[tokio::test]
    async fn engines_share_the_data_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = PolygonConfig::new("test_key", dir.path());
        let gateway = Arc::new(StubGateway::new());
        let provider = PolygonProvider::with_gateway(gateway, &config).unwrap();

        let file = provider
            .factor_files
            .get(&Symbol::equity("XYZ"))
            .await
            .unwrap();
        assert_eq!(file.rows().len(), 2);
        assert!(dir.path().join("equity/usa/factor_files/xyz.csv").exists());
    }
}
