//! consilio-cli: list and filter meetings through the Consilio HTTP API
//!
//! Filters travel exactly as they do in the dashboard URL, so anything the CLI
//! prints with `filter-url` can be pasted into a browser and vice versa.
//!
//! # Subcommands
//! - `meetings [--status] [--search] [--agent-id] [--page] [--json]`: one page
//! - `filter-url [--from <location>] [filters...]`: canonical filter URL
//! - `browse [--from <location>]`: interactive filtering, newest filter wins
//! - `status`: show server health

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use consilio_core::listing::FetchOutcome;
use consilio_core::models::{Meeting, MeetingStatus, Page};
use consilio_core::{
    FilterPatch, FilterState, FilterStore, ListingController, ListingSource, ListingView,
    UrlFilterStore,
};
use reqwest::header::COOKIE;
use reqwest::StatusCode;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8780";
const MEETINGS_PATH: &str = "/meetings";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "consilio-cli", version, about = "Consilio meetings from the terminal")]
struct Cli {
    /// Consilio HTTP server URL (overrides CONSILIO_HTTP_URL env var)
    #[arg(long, env = "CONSILIO_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Session cookie as sent by the browser, e.g. `better-auth.session_token=...`
    #[arg(long, env = "CONSILIO_COOKIE")]
    cookie: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Default, Args)]
struct FilterArgs {
    /// Only meetings in this status
    #[arg(long, value_parser = parse_status)]
    status: Option<MeetingStatus>,

    /// Case-insensitive substring of the meeting name
    #[arg(long)]
    search: Option<String>,

    /// Only meetings run by this agent
    #[arg(long)]
    agent_id: Option<String>,

    /// 1-based page number
    #[arg(long)]
    page: Option<u32>,
}

impl FilterArgs {
    /// Only flags that were given become part of the patch.
    fn patch(&self) -> FilterPatch {
        FilterPatch {
            status: self.status.map(Some),
            search: self.search.clone(),
            agent_id: self.agent_id.clone(),
            page: self.page,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List one page of meetings
    Meetings {
        #[command(flatten)]
        filters: FilterArgs,

        /// Print the raw page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the canonical dashboard URL for a set of filters
    FilterUrl {
        /// Start from an existing location such as `/meetings?status=active`
        #[arg(long, default_value = MEETINGS_PATH)]
        from: String,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Filter meetings interactively; type `help` for commands
    Browse {
        #[arg(long, default_value = MEETINGS_PATH)]
        from: String,
    },

    /// Show Consilio server status
    Status,
}

fn parse_status(raw: &str) -> Result<MeetingStatus, String> {
    raw.parse::<MeetingStatus>().map_err(|e| e.to_string())
}

// ============================================================================
// HTTP Listing Source
// ============================================================================

/// Reads meeting pages from `GET /api/meetings`.
#[derive(Debug, Clone)]
pub struct HttpListingSource {
    client: reqwest::Client,
    server: String,
    cookie: Option<String>,
}

impl HttpListingSource {
    pub fn new(server: &str, cookie: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            cookie,
        })
    }

    fn meetings_url(&self, filters: &FilterState) -> String {
        let query = filters.serialize();
        if query.is_empty() {
            format!("{}/api/meetings", self.server)
        } else {
            format!("{}/api/meetings?{}", self.server, query)
        }
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch(&self, filters: &FilterState) -> anyhow::Result<Page<Meeting>> {
        let mut request = self.client.get(self.meetings_url(filters));
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("connection failed to {}", self.server))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => bail!("not signed in (set --cookie or CONSILIO_COOKIE)"),
            status if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                bail!("server returned {}: {}", status, body)
            }
            _ => Ok(resp.json().await.context("failed to parse meetings page")?),
        }
    }
}

// ============================================================================
// Output
// ============================================================================

fn render_page(filters: &FilterState, page: &Page<Meeting>) -> String {
    if page.items.is_empty() {
        return "No meetings found".to_string();
    }

    let mut out = String::new();
    for m in &page.items {
        out.push_str(&format!("{}  {:<10}  {}\n", m.id, m.status.as_str(), m.name));
    }
    out.push_str(&format!(
        "Page {} of {} ({} meetings)",
        filters.page(),
        page.total_pages.max(1),
        page.total
    ));
    out
}

fn render_view(view: &ListingView) -> String {
    match view {
        ListingView::Idle => String::new(),
        ListingView::Loading { filters } => format!("Loading {} ...", describe(filters)),
        ListingView::Ready { filters, page } => {
            format!("{}\n{}", describe(filters), render_page(filters, page))
        }
        ListingView::Failed { filters, message } => {
            format!("{}\nError loading meetings: {}", describe(filters), message)
        }
    }
}

fn describe(filters: &FilterState) -> String {
    let query = filters.serialize();
    if query.is_empty() {
        format!("[{}]", MEETINGS_PATH)
    } else {
        format!("[{}?{}]", MEETINGS_PATH, query)
    }
}

// ============================================================================
// Browse
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum BrowseCommand {
    Apply(FilterPatch),
    Clear,
    Show,
    Help,
    Quit,
}

const BROWSE_HELP: &str = "\
status <upcoming|active|completed|processing|cancelled|all>
search [text]        (empty clears)
agent [id]           (empty clears)
page <n> | next | prev
clear                reset every filter
show                 print the current listing
quit";

fn parse_browse_command(line: &str, current: &FilterState) -> Result<BrowseCommand, String> {
    let line = line.trim();
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(v, r)| (v, r.trim()))
        .unwrap_or((line, ""));

    match verb {
        "status" => match rest {
            "" | "all" => Ok(BrowseCommand::Apply(FilterPatch::status(None))),
            raw => parse_status(raw).map(|s| BrowseCommand::Apply(FilterPatch::status(Some(s)))),
        },
        // A new search or agent starts from the first page again.
        "search" => Ok(BrowseCommand::Apply(FilterPatch {
            page: Some(1),
            ..FilterPatch::search(rest)
        })),
        "agent" => Ok(BrowseCommand::Apply(FilterPatch {
            page: Some(1),
            ..FilterPatch::agent_id(rest)
        })),
        "page" => rest
            .parse::<u32>()
            .map(|n| BrowseCommand::Apply(FilterPatch::page(n)))
            .map_err(|_| format!("not a page number: {:?}", rest)),
        "next" => Ok(BrowseCommand::Apply(FilterPatch::page(
            current.page().saturating_add(1),
        ))),
        "prev" => Ok(BrowseCommand::Apply(FilterPatch::page(
            current.page().saturating_sub(1),
        ))),
        "clear" => Ok(BrowseCommand::Clear),
        "show" | "" => Ok(BrowseCommand::Show),
        "help" | "?" => Ok(BrowseCommand::Help),
        "quit" | "exit" | "q" => Ok(BrowseCommand::Quit),
        other => Err(format!("unknown command: {} (try `help`)", other)),
    }
}

async fn do_browse(source: HttpListingSource, from: &str) -> anyhow::Result<()> {
    let mut location = UrlFilterStore::from_location(from);
    let controller = ListingController::new(source);
    let mut pending = Some(controller.refresh(location.read()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            outcome = async {
                match pending.as_mut() {
                    Some(handle) => handle.await,
                    None => std::future::pending().await,
                }
            }, if pending.is_some() => {
                pending = None;
                if matches!(outcome, Ok(FetchOutcome::Applied)) {
                    println!("{}", render_view(&controller.view()));
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_browse_command(&line, &location.read()) {
                    Ok(BrowseCommand::Apply(patch)) => {
                        let next = location.update(patch);
                        println!("{}", location.location());
                        pending = Some(controller.refresh(next));
                    }
                    Ok(BrowseCommand::Clear) => {
                        let next = location.clear();
                        println!("{}", location.location());
                        pending = Some(controller.refresh(next));
                    }
                    Ok(BrowseCommand::Show) => println!("{}", render_view(&controller.view())),
                    Ok(BrowseCommand::Help) => println!("{}", BROWSE_HELP),
                    Ok(BrowseCommand::Quit) => break,
                    Err(message) => eprintln!("{}", message),
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// One-shot Commands
// ============================================================================

async fn do_meetings(source: &HttpListingSource, filters: &FilterArgs, json: bool) -> anyhow::Result<()> {
    let state = FilterState::default().apply(filters.patch());
    let page = source.fetch(&state).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        println!("{}", render_page(&state, &page));
    }
    Ok(())
}

fn do_filter_url(from: &str, filters: &FilterArgs) -> String {
    let mut location = UrlFilterStore::from_location(from);
    location.update(filters.patch());
    location.location()
}

/// Show the server status by calling GET /health.
async fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| anyhow!("cannot reach {}: {}", url, e))?;

    if !resp.status().is_success() {
        bail!("server unhealthy (HTTP {})", resp.status());
    }

    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    println!("Consilio server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
    println!("Store:           {}", body["store"].as_str().unwrap_or("?"));
    if let Some(pg) = body["postgresql"].as_str() {
        println!("PostgreSQL:      {}", pg);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::FilterUrl { from, filters } => {
            println!("{}", do_filter_url(&from, &filters));
            Ok(())
        }
        Commands::Status => do_status(&server).await,
        Commands::Meetings { filters, json } => match HttpListingSource::new(&server, cli.cookie) {
            Ok(source) => do_meetings(&source, &filters, json).await,
            Err(e) => Err(e),
        },
        Commands::Browse { from } => match HttpListingSource::new(&server, cli.cookie) {
            Ok(source) => do_browse(source, &from).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("consilio-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn empty_page() -> serde_json::Value {
        serde_json::json!({ "items": [], "total": 0, "totalPages": 0 })
    }

    #[test]
    fn test_cli_parses_meetings_filters() {
        let cli = Cli::try_parse_from([
            "consilio-cli",
            "meetings",
            "--status",
            "active",
            "--agent-id",
            "a1",
            "--page",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Meetings { filters, json } => {
                assert!(!json);
                let state = FilterState::default().apply(filters.patch());
                assert_eq!(state.serialize(), "status=active&agentId=a1&page=3");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["consilio-cli", "meetings", "--status", "paused"]).is_err());
    }

    #[test]
    fn test_filter_url_keeps_untouched_filters() {
        let filters = FilterArgs {
            page: Some(2),
            ..FilterArgs::default()
        };
        assert_eq!(
            do_filter_url("/meetings?search=retro&utm=1", &filters),
            "/meetings?search=retro&page=2"
        );
        assert_eq!(do_filter_url("/meetings", &FilterArgs::default()), "/meetings");
    }

    #[test]
    fn test_browse_commands() {
        let current = FilterState::default().with_page(4);
        assert_eq!(
            parse_browse_command("status completed", &current),
            Ok(BrowseCommand::Apply(FilterPatch::status(Some(MeetingStatus::Completed))))
        );
        assert_eq!(
            parse_browse_command("status all", &current),
            Ok(BrowseCommand::Apply(FilterPatch::status(None)))
        );
        assert_eq!(
            parse_browse_command("next", &current),
            Ok(BrowseCommand::Apply(FilterPatch::page(5)))
        );
        assert_eq!(
            parse_browse_command("  search weekly sync ", &current),
            Ok(BrowseCommand::Apply(FilterPatch {
                search: Some("weekly sync".to_string()),
                page: Some(1),
                ..FilterPatch::default()
            }))
        );
        assert_eq!(parse_browse_command("clear", &current), Ok(BrowseCommand::Clear));
        assert!(parse_browse_command("page two", &current).is_err());
        assert!(parse_browse_command("dance", &current).is_err());
    }

    #[test]
    fn test_prev_on_first_page_stays_on_first_page() {
        let first = FilterState::default();
        let Ok(BrowseCommand::Apply(patch)) = parse_browse_command("prev", &first) else {
            panic!("prev should apply a patch");
        };
        assert_eq!(first.apply(patch).page(), 1);
    }

    #[test]
    fn test_next_on_last_page_stays_on_last_page() {
        let last = FilterState::parse("page=4294967295");
        assert_eq!(last.page(), u32::MAX);
        assert_eq!(
            parse_browse_command("next", &last),
            Ok(BrowseCommand::Apply(FilterPatch::page(u32::MAX)))
        );
    }

    #[test]
    fn test_render_empty_page() {
        let page: Page<Meeting> = Page::empty();
        assert_eq!(render_page(&FilterState::default(), &page), "No meetings found");
    }

    #[tokio::test]
    async fn test_source_sends_filters_and_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/meetings"))
            .and(query_param("status", "active"))
            .and(header("cookie", "better-auth.session_token=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .mount(&server)
            .await;

        let source =
            HttpListingSource::new(&server.uri(), Some("better-auth.session_token=abc".to_string()))
                .unwrap();
        let filters = FilterState::default().with_status(Some(MeetingStatus::Active));
        let page = source.fetch(&filters).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_source_reports_missing_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/meetings"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let source = HttpListingSource::new(&server.uri(), None).unwrap();
        let err = source.fetch(&FilterState::default()).await.unwrap_err();
        assert!(err.to_string().contains("not signed in"));
    }

    #[tokio::test]
    async fn test_controller_over_http_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/meetings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .mount(&server)
            .await;

        let controller = ListingController::new(HttpListingSource::new(&server.uri(), None).unwrap());
        let outcome = controller.refresh(FilterState::default()).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Applied);
        assert!(render_view(&controller.view()).contains("No meetings found"));
    }
}
