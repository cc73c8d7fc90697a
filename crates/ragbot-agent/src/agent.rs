//! The conversational agent.

use serde::Serialize;
use tracing::{debug, info};

use ragbot_chunk::RecursiveSplitter;
use ragbot_core::{
    AppConfig, BotConfig, ChatModel, Embedder, IndexStatus, Result, SearchHit, SourceFilter,
    Splitter,
};
use ragbot_embed::OpenAiEmbedder;
use ragbot_store::VectorStore;

use crate::chat::OpenAiChatModel;
use crate::history::ChatHistory;
use crate::prompt::{conversation_prompt, document_prompt};

/// A model reply and the references it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub references: Vec<SearchHit>,
}

/// Retrieval-augmented chat agent.
pub struct Agent {
    store: VectorStore,
    embedder: Box<dyn Embedder>,
    splitter: Box<dyn Splitter>,
    model: Box<dyn ChatModel>,
    history: ChatHistory,
    top_k: usize,
    threshold: f32,
}

impl Agent {
    pub fn new(
        store: VectorStore,
        embedder: Box<dyn Embedder>,
        splitter: Box<dyn Splitter>,
        model: Box<dyn ChatModel>,
        bot: &BotConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            splitter,
            model,
            history: ChatHistory::new(bot.memory_rounds),
            top_k: bot.top_k,
            threshold: bot.threshold,
        }
    }

    /// Build every component from configuration.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let store = VectorStore::open(&config.store).await?;
        let embedder = OpenAiEmbedder::from_config(&config.embedding);
        let splitter = RecursiveSplitter::from_config(&config.splitter)?;
        let model = OpenAiChatModel::from_config(&config.chat);

        info!(
            "Agent ready: chat model {}, embedding model {}",
            config.chat.model, config.embedding.model
        );

        Ok(Self::new(
            store,
            Box::new(embedder),
            Box::new(splitter),
            Box::new(model),
            &config.bot,
        ))
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Split, embed and store `text` under `source`. Returns the chunk count.
    pub async fn ingest(&mut self, text: &str, source: &str) -> Result<usize> {
        let chunks = self.splitter.split(text)?;
        if chunks.is_empty() {
            debug!("Nothing to ingest from {}", source);
            return Ok(0);
        }

        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let embeddings = self.embedder.embed(&refs).await?;

        let count = chunks.len();
        let sources = vec![source.to_string(); count];
        self.store.insert_batch(chunks, embeddings, sources).await?;

        info!(
            "Ingested {} chunks from {} into {}",
            count,
            source,
            self.store.namespace()
        );
        Ok(count)
    }

    /// Answer `query` from the best references passing `filter`.
    ///
    /// Hits scoring below the configured threshold are left out of the
    /// prompt. `k` defaults to the configured `top_k`.
    pub async fn ask(&self, query: &str, filter: &SourceFilter, k: Option<usize>) -> Result<Answer> {
        let k = k.unwrap_or(self.top_k);
        let embedding = self.embedder.embed_query(query).await?;

        let references: Vec<SearchHit> = self
            .store
            .search(&embedding, filter, k)
            .await?
            .into_iter()
            .filter(|hit| hit.score >= self.threshold)
            .collect();

        debug!("Answering with {} references", references.len());
        let text = self.model.complete(&document_prompt(query, &references)).await?;

        Ok(Answer { text, references })
    }

    /// Continue the conversation and remember the exchange.
    pub async fn chat(&mut self, text: &str) -> Result<Answer> {
        let prompt = conversation_prompt(&self.history.render(), text);
        let reply = self.model.complete(&prompt).await?;

        self.history.push(text, reply.clone());
        Ok(Answer {
            text: reply,
            references: Vec::new(),
        })
    }

    /// Route to [`ask`](Self::ask) when `refer` is set, else to [`chat`](Self::chat).
    pub async fn react(
        &mut self,
        query: &str,
        refer: bool,
        filter: &SourceFilter,
        k: Option<usize>,
    ) -> Result<Answer> {
        if refer {
            self.ask(query, filter, k).await
        } else {
            self.chat(query).await
        }
    }

    /// Switch the active namespace (the default alias is accepted).
    pub async fn set_table(&mut self, name: &str) -> Result<()> {
        self.store.switch_namespace(name).await
    }

    pub async fn reset_table(&mut self) -> Result<()> {
        self.store.reset_namespace().await
    }

    pub async fn delete_by_source(&mut self, source: &str) -> Result<u64> {
        self.store.delete_by_source(source).await
    }

    /// Replace the conversation history with `pairs` of (human, ai) turns.
    pub fn load_history<I, H, A>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (H, A)>,
        H: Into<String>,
        A: Into<String>,
    {
        self.history.load(pairs);
    }

    pub async fn index_status(&self) -> Result<IndexStatus> {
        self.store.index_status().await
    }
}
