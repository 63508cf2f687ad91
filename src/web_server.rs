use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Form, Router,
};
use minijinja::{context, Value};
use minijinja_autoreload::AutoReloader;
use serde::Deserialize;
use std::{
    collections::HashMap,
    net::SocketAddr,
    path::Path as FsPath,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, RwLock};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::advocacy::{self, AdvocacyRequest};
use crate::analyst::{AnalystContext, AnalystProfile, CredentialSource, Upload};
use crate::config::Settings;
use crate::constants::DEFAULT_WORKSPACE_IDLE_SECS;
use crate::fetcher::Fetcher;
use crate::render::{create_minijinja_env, markdown_value, render_template};

type PageResult = Result<Html<String>, Html<String>>;

// One browser tab's analyst context. Events for the same id are serialized by
// the context mutex.
#[derive(Clone)]
struct Workspace {
    profile: AnalystProfile,
    context: Arc<Mutex<AnalystContext>>,
    last_used: Instant,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    settings: Arc<Settings>,
    fetcher: Fetcher,
    // In-memory only; idle contexts are dropped when a new one opens.
    workspaces: Arc<RwLock<HashMap<Uuid, Workspace>>>,
    idle_timeout: Duration,
}

impl AppState {
    pub fn new(settings: Settings, templates_dir: impl AsRef<FsPath>) -> Result<Self> {
        let fetcher = settings
            .fetcher()
            .context("Failed to build campaign page client")?;
        Ok(Self {
            templates: Arc::new(create_minijinja_env(templates_dir)),
            settings: Arc::new(settings),
            fetcher,
            workspaces: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout: Duration::from_secs(DEFAULT_WORKSPACE_IDLE_SECS),
        })
    }

    /// How long an analyst workspace may sit unused before it is discarded.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    fn render(&self, name: &str, context: Value) -> PageResult {
        render_template(&self.templates, name, context)
            .map(Html)
            .map_err(|e| {
                error!("Failed to get or render template {}: {}", name, e);
                Html(format!("Internal Server Error: {}", e))
            })
    }

    async fn open_workspace(&self, profile: AnalystProfile) -> Uuid {
        let context = AnalystContext::new(profile);
        let id = context.id();
        let mut workspaces = self.workspaces.write().await;

        // Sweep abandoned tabs before adding another; a handler still holding
        // an evicted context keeps it alive until the request finishes.
        let before = workspaces.len();
        workspaces.retain(|_, w| w.last_used.elapsed() < self.idle_timeout);
        let evicted = before - workspaces.len();
        if evicted > 0 {
            info!(evicted, remaining = workspaces.len(), "Discarded idle analyst workspaces");
        }

        workspaces.insert(
            id,
            Workspace {
                profile,
                context: Arc::new(Mutex::new(context)),
                last_used: Instant::now(),
            },
        );
        info!(%id, %profile, "Opened analyst workspace");
        id
    }

    // Lookups count as use, so the write lock is needed to refresh the clock.
    async fn workspace(&self, profile: AnalystProfile, id: Uuid) -> Option<Arc<Mutex<AnalystContext>>> {
        let mut workspaces = self.workspaces.write().await;
        let workspace = workspaces.get_mut(&id).filter(|w| w.profile == profile)?;
        workspace.last_used = Instant::now();
        Some(workspace.context.clone())
    }
}

fn workspace_path(profile: AnalystProfile, id: Uuid) -> String {
    format!("/analyst/{}/{}", profile.slug(), id)
}

fn profile_value(profile: AnalystProfile) -> Value {
    context! {
        slug => profile.slug(),
        title => profile.title(),
        caption => profile.caption(),
        upload_label => profile.upload_label(),
        idle_hint => profile.idle_hint(),
    }
}

async fn index_handler(State(state): State<AppState>) -> PageResult {
    let profiles: Vec<Value> = AnalystProfile::ALL.into_iter().map(profile_value).collect();
    state.render(
        "index.html",
        context! {
            title => "canvass",
            profiles => profiles,
        },
    )
}

async fn advocacy_form(State(state): State<AppState>) -> PageResult {
    state.render(
        "advocacy.html",
        context! {
            title => "Advocacy Message Generator",
            form => context! { url => "", constituent_name => "", constituency => "" },
        },
    )
}

async fn advocacy_submit(
    State(state): State<AppState>,
    Form(request): Form<AdvocacyRequest>,
) -> PageResult {
    let form = context! {
        url => request.url.clone(),
        constituent_name => request.constituent_name.clone(),
        constituency => request.constituency.clone(),
    };

    // The advocacy page has no key field; only the configured key can serve it.
    let Some(api_key) = state.settings.api_key.clone() else {
        warn!("Advocacy request rejected: no API key configured");
        return state.render(
            "advocacy.html",
            context! {
                title => "Advocacy Message Generator",
                form => form,
                error => "No Google API key is configured. Set GOOGLE_API_KEY and restart.",
            },
        );
    };

    // Built per request from the configured key and model settings.
    let client = state.settings.gemini_client(api_key);
    let outcome = advocacy::run(&state.fetcher, &client, state.settings.summarize, &request).await;

    state.render(
        "advocacy.html",
        context! {
            title => "Advocacy Message Generator",
            form => form,
            summary => outcome.summary().map(markdown_value),
            message => outcome.message(),
            error => outcome.error(),
        },
    )
}

async fn analyst_new(State(state): State<AppState>, Path(profile): Path<AnalystProfile>) -> Redirect {
    let id = state.open_workspace(profile).await;
    Redirect::to(&workspace_path(profile, id))
}

async fn analyst_page(
    State(state): State<AppState>,
    Path((profile, id)): Path<(AnalystProfile, Uuid)>,
) -> Response {
    let Some(context) = state.workspace(profile, id).await else {
        // Unknown or expired id: start over with a fresh workspace.
        return Redirect::to(&format!("/analyst/{}", profile.slug())).into_response();
    };
    // Held while rendering so a concurrent turn cannot tear the transcript.
    let context = context.lock().await;

    // Model replies are Markdown; user text goes through the same path so both
    // end up escaped.
    let transcript: Vec<Value> = context
        .transcript()
        .iter()
        .map(|message| {
            context! {
                role => message.role,
                timestamp => message.timestamp.clone(),
                html => markdown_value(&message.content),
            }
        })
        .collect();

    state
        .render(
            "analyst.html",
            context! {
                title => profile.title(),
                profile => profile_value(profile),
                action_base => workspace_path(profile, id),
                state => context.state(),
                ready => context.is_ready(),
                error => context.error(),
                data_identity => context.data_identity(),
                transcript => transcript,
                asks_for_key => profile.credential_source() == CredentialSource::Interactive,
                has_configured_key => state.settings.api_key.is_some(),
            },
        )
        .into_response()
}

async fn read_setup_form(
    mut multipart: Multipart,
) -> Result<(Option<String>, Option<Upload>), axum::extract::multipart::MultipartError> {
    let mut api_key = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "api_key" => api_key = Some(field.text().await?),
            "dataset" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                // Browsers send an unnamed empty part when no file was picked.
                if !file_name.is_empty() {
                    upload = Some(Upload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            other => warn!("Ignoring unexpected form field: {}", other),
        }
    }
    Ok((api_key, upload))
}

async fn analyst_setup(
    State(state): State<AppState>,
    Path((profile, id)): Path<(AnalystProfile, Uuid)>,
    multipart: Multipart,
) -> Response {
    let Some(context) = state.workspace(profile, id).await else {
        return Redirect::to(&format!("/analyst/{}", profile.slug())).into_response();
    };

    // Read the whole form before locking; large uploads must not block the page.
    let (api_key, upload) = match read_setup_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            warn!("Malformed setup form: {}", e);
            return e.into_response();
        }
    };

    let outcome = context
        .lock()
        .await
        .configure(&state.settings, api_key.as_deref(), upload)
        .await;
    info!(%id, ?outcome, "Setup handled");

    // Post/redirect/get: a browser refresh re-renders instead of re-uploading.
    Redirect::to(&workspace_path(profile, id)).into_response()
}

#[derive(Deserialize)]
struct AskForm {
    question: String,
}

async fn analyst_ask(
    State(state): State<AppState>,
    Path((profile, id)): Path<(AnalystProfile, Uuid)>,
    Form(form): Form<AskForm>,
) -> Redirect {
    if let Some(context) = state.workspace(profile, id).await {
        let outcome = context.lock().await.ask(&form.question).await;
        info!(%id, ?outcome, "Chat turn handled");
        Redirect::to(&workspace_path(profile, id))
    } else {
        Redirect::to(&format!("/analyst/{}", profile.slug()))
    }
}

pub fn router(state: AppState, static_dir: impl AsRef<FsPath>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/advocacy", get(advocacy_form).post(advocacy_submit))
        .route("/analyst/:profile", get(analyst_new))
        .route("/analyst/:profile/:id", get(analyst_page))
        // Datasets are embedded whole; no upload cap.
        .route(
            "/analyst/:profile/:id/setup",
            post(analyst_setup).layer(DefaultBodyLimit::disable()),
        )
        .route("/analyst/:profile/:id/ask", post(analyst_ask))
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(
    addr: SocketAddr,
    state: AppState,
    static_dir: impl AsRef<FsPath>,
) -> Result<()> {
    let app = router(state, static_dir);

    info!("Web server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
