use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::messaging::MessageBus;
use crate::models::ContextId;
use crate::sensing::{AgentDeps, CaptureAgent};

use super::{is_restricted_url, ContextHost, InjectionError, PageInfo, PageSurface};

struct PageRecord {
    url: String,
    surface: PageSurface,
    teardown: CancellationToken,
    agent: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct HostState {
    pages: BTreeMap<ContextId, PageRecord>,
    active: Option<ContextId>,
}

/// In-process stand-in for the browser's tab and scripting APIs.
///
/// Each page is an isolated context; injecting spawns a [`CaptureAgent`]
/// inside it. Closing a page tears its agent down.
#[derive(Clone)]
pub struct BrowserContexts {
    state: Arc<Mutex<HostState>>,
    next_id: Arc<AtomicU64>,
    bus: MessageBus,
    agent_deps: AgentDeps,
}

impl BrowserContexts {
    pub fn new(bus: MessageBus, agent_deps: AgentDeps) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            bus,
            agent_deps,
        }
    }

    /// Opens a page and makes it the active one.
    pub async fn open_page(&self, url: impl Into<String>) -> ContextId {
        let id = ContextId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let url = url.into();
        debug!("opened page {id} at {url}");

        let mut state = self.state.lock().await;
        state.pages.insert(
            id,
            PageRecord {
                url,
                surface: PageSurface::new(),
                teardown: CancellationToken::new(),
                agent: None,
            },
        );
        state.active = Some(id);
        id
    }

    pub async fn activate(&self, context: ContextId) -> bool {
        let mut state = self.state.lock().await;
        if state.pages.contains_key(&context) {
            state.active = Some(context);
            true
        } else {
            false
        }
    }

    /// Tears the page down; any agent inside it releases its capture.
    pub async fn close_page(&self, context: ContextId) {
        let record = {
            let mut state = self.state.lock().await;
            if state.active == Some(context) {
                state.active = None;
            }
            state.pages.remove(&context)
        };

        let Some(record) = record else {
            return;
        };
        record.teardown.cancel();
        if let Some(agent) = record.agent {
            if let Err(err) = agent.await {
                warn!("agent in {context} ended abnormally: {err}");
            }
        }
        info!("closed page {context}");
    }

    pub async fn surface(&self, context: ContextId) -> Option<PageSurface> {
        let state = self.state.lock().await;
        state.pages.get(&context).map(|page| page.surface.clone())
    }

    pub async fn has_agent(&self, context: ContextId) -> bool {
        let state = self.state.lock().await;
        state
            .pages
            .get(&context)
            .and_then(|page| page.agent.as_ref())
            .is_some_and(|agent| !agent.is_finished())
    }
}

#[async_trait]
impl ContextHost for BrowserContexts {
    async fn active_context(&self) -> Option<PageInfo> {
        let state = self.state.lock().await;
        let id = state.active?;
        state.pages.get(&id).map(|page| PageInfo {
            id,
            url: page.url.clone(),
        })
    }

    async fn inject_agent(&self, context: ContextId) -> Result<(), InjectionError> {
        let mut state = self.state.lock().await;
        let page = state
            .pages
            .get_mut(&context)
            .ok_or(InjectionError::NoSuchContext(context))?;

        if is_restricted_url(&page.url) {
            return Err(InjectionError::Restricted(page.url.clone()));
        }
        if page.agent.as_ref().is_some_and(|agent| !agent.is_finished()) {
            debug!("agent already present in {context}");
            return Ok(());
        }

        let handle = CaptureAgent::spawn(
            context,
            self.bus.clone(),
            self.agent_deps.clone(),
            page.surface.clone(),
            page.teardown.child_token(),
        );
        page.agent = Some(handle);
        info!("injected capture agent into {context}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FallbackClassifier;
    use crate::messaging::{AgentCommand, AgentReply};
    use crate::sensing::{AgentConfig, SyntheticCamera};

    fn host(camera: &SyntheticCamera) -> (MessageBus, BrowserContexts) {
        let bus = MessageBus::default();
        let deps = AgentDeps {
            device: Arc::new(camera.clone()),
            classifier: Arc::new(FallbackClassifier::time_of_day_only()),
            config: AgentConfig::default(),
        };
        (bus.clone(), BrowserContexts::new(bus, deps))
    }

    #[tokio::test]
    async fn newest_page_is_active() {
        let camera = SyntheticCamera::new();
        let (_, browser) = host(&camera);
        browser.open_page("https://a.example").await;
        let second = browser.open_page("https://b.example").await;

        let active = browser.active_context().await.unwrap();
        assert_eq!(active.id, second);
        assert_eq!(active.url, "https://b.example");
    }

    #[tokio::test]
    async fn restricted_pages_refuse_injection() {
        let camera = SyntheticCamera::new();
        let (bus, browser) = host(&camera);
        let ctx = browser.open_page("chrome://settings").await;

        let err = browser.inject_agent(ctx).await.unwrap_err();
        assert!(matches!(err, InjectionError::Restricted(_)));
        assert!(!bus.has_listener(ctx));
    }

    #[tokio::test]
    async fn injection_makes_the_context_answer() {
        let camera = SyntheticCamera::new();
        let (bus, browser) = host(&camera);
        let ctx = browser.open_page("https://example.com").await;

        browser.inject_agent(ctx).await.unwrap();
        browser.inject_agent(ctx).await.unwrap();
        assert!(browser.has_agent(ctx).await);

        let reply = bus.send_command(ctx, AgentCommand::GetStatus).await.unwrap();
        assert!(matches!(reply, AgentReply::Status(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_a_page_releases_its_capture() {
        let camera = SyntheticCamera::new();
        let (bus, browser) = host(&camera);
        let ctx = browser.open_page("https://example.com").await;
        browser.inject_agent(ctx).await.unwrap();
        bus.send_command(ctx, AgentCommand::StartSession).await.unwrap();
        assert_eq!(camera.live_streams(), 1);

        browser.close_page(ctx).await;

        assert_eq!(camera.live_streams(), 0);
        assert!(browser.active_context().await.is_none());
        assert!(!bus.has_listener(ctx));
    }

    #[tokio::test]
    async fn activating_an_older_page_retargets() {
        let camera = SyntheticCamera::new();
        let (_, browser) = host(&camera);
        let first = browser.open_page("https://a.example").await;
        browser.open_page("https://b.example").await;

        assert!(browser.activate(first).await);
        assert_eq!(browser.active_context().await.unwrap().id, first);
        assert!(!browser.activate(ContextId(42)).await);
        assert_eq!(browser.active_context().await.unwrap().id, first);
    }

    #[tokio::test]
    async fn missing_page_cannot_be_injected() {
        let camera = SyntheticCamera::new();
        let (_, browser) = host(&camera);
        let err = browser.inject_agent(ContextId(99)).await.unwrap_err();
        assert_eq!(err, InjectionError::NoSuchContext(ContextId(99)));
    }
}
