use std::sync::Arc;

use tokio::runtime::{Builder, Handle};

use crate::{
    Config, Engine, EvflowError, Result, StoreType,
    common::{JsonSerializer, Serializer},
    store::Store,
    workflow::{ActivityFactory, ActivityRegistry},
};

pub struct EngineBuilder {
    config: Config,
    store: Option<Store>,
    factory: Option<Arc<dyn ActivityFactory>>,
    serializer: Option<Arc<dyn Serializer>>,
    rt: Option<Handle>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            store: None,
            factory: None,
            serializer: None,
            rt: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn worker_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.worker_number = n;
        self
    }

    /// Uses `store` instead of the one described by the config.
    pub fn store(
        mut self,
        store: Store,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn factory(
        mut self,
        factory: Arc<dyn ActivityFactory>,
    ) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn serializer(
        mut self,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Runs the engine on an existing runtime. Defaults to the current
    /// runtime, or a new one when called outside of tokio.
    pub fn runtime(
        mut self,
        runtime: Handle,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Builds an engine over an explicit store or the in-memory one.
    pub fn build(mut self) -> Result<Engine> {
        let store = match self.store.take() {
            Some(store) => store,
            None if self.config.store.store_type == StoreType::Mem => Store::mem(),
            None => return Err(EvflowError::Config("a postgres store is opened by build_async".to_string())),
        };
        self.assemble(store)
    }

    /// Builds an engine, opening the store described by the config.
    pub async fn build_async(mut self) -> Result<Engine> {
        let store = match self.store.take() {
            Some(store) => store,
            None => Store::from_config(&self.config.store).await?,
        };
        self.assemble(store)
    }

    fn assemble(
        self,
        store: Store,
    ) -> Result<Engine> {
        self.config.validate()?;

        let (runtime, owned) = match self.rt.map(Ok).unwrap_or_else(Handle::try_current) {
            Ok(handle) => (handle, None),
            Err(_) => {
                let runtime = Arc::new(Builder::new_multi_thread().worker_threads(self.config.worker_number.into()).enable_all().build()?);
                (runtime.handle().clone(), Some(runtime))
            }
        };
        let factory: Arc<dyn ActivityFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(ActivityRegistry::new()),
        };
        let serializer: Arc<dyn Serializer> = match self.serializer {
            Some(serializer) => serializer,
            None => Arc::new(JsonSerializer),
        };

        Ok(Engine::new(self.config, store, factory, serializer, runtime, owned))
    }
}

#[cfg(test)]
mod test {
    use crate::{Config, EngineBuilder};

    #[test]
    fn test_build_outside_runtime() {
        let engine = EngineBuilder::new().worker_number(2).build().unwrap();
        assert!(!engine.is_running());
        engine.launch();
        assert!(engine.is_running());
        engine.shutdown();
        assert!(!engine.is_running());
        engine.launch();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_postgres_requires_async_build() {
        let config = Config::load_from_str(
            r#"
            [store]
            store_type = "postgres"
            [store.postgres]
            database_url = "postgresql://localhost/evflow"
            "#,
        )
        .unwrap();
        assert!(EngineBuilder::new().config(config).build().is_err());
    }

    #[test]
    fn test_rejects_zero_workers() {
        assert!(EngineBuilder::new().worker_number(0).build().is_err());
    }
}
