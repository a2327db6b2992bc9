//! Wiring shared by the commands: config, provider, store, orchestrator.

use std::sync::Arc;

use carwise_agent::{FallbackOrchestrator, SessionStore};
use carwise_config::AppConfig;
use carwise_core::provider::Provider;
use carwise_store::{ChunkConfig, DisabledEmbedder, Embedder, JsonlStore, ProviderEmbedder};
use carwise_tools::WebSearchTool;
use tracing::{debug, warn};

pub struct Runtime {
    pub config: AppConfig,
    pub provider: Option<Arc<dyn Provider>>,
    pub store: Arc<JsonlStore>,
}

impl Runtime {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let provider = match carwise_providers::build_from_config(&config) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!(error = %e, "Language model not configured");
                None
            }
        };

        let embedder: Arc<dyn Embedder> = match &provider {
            Some(p) => Arc::new(ProviderEmbedder::new(p.clone(), config.store.embedding_model.clone())),
            None => Arc::new(DisabledEmbedder::new("no API key configured")),
        };

        let path = config.store.resolved_path();
        debug!(path = %path.display(), "Opening knowledge base");
        let store = Arc::new(JsonlStore::open(path, embedder)?);

        Ok(Self {
            config,
            provider,
            store,
        })
    }

    pub fn chunking(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: self.config.store.chunk_size,
            chunk_overlap: self.config.store.chunk_overlap,
        }
    }

    /// The language model, or setup instructions on stderr.
    pub fn require_provider(&self) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
        if let Some(provider) = &self.provider {
            return Ok(provider.clone());
        }
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY=sk-...      (OpenAI or compatible endpoint)");
        eprintln!("    CARWISE_API_KEY=sk-...     (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        Err("No API key found. See above for setup instructions.".into())
    }

    pub fn orchestrator(&self) -> Result<FallbackOrchestrator, Box<dyn std::error::Error>> {
        let provider = self.require_provider()?;
        let web_search = WebSearchTool::from_config(&self.config.search, self.config.orchestrator.request_timeout());
        let sessions = Arc::new(SessionStore::new(self.config.orchestrator.memory_window));

        Ok(FallbackOrchestrator::new(
            provider,
            self.store.clone(),
            web_search,
            sessions,
            &self.config,
        ))
    }
}
