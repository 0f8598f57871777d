//! Quest Graph MCP Server
//!
//! Serves quests, their addressed posts and task trees over MCP stdio, and
//! offers a `check` command that validates stored task graphs.

use anyhow::Result;
use clap::Parser;
use quest_graph::cli::{CheckArgs, Cli, Command};
use quest_graph::config::Config;
use quest_graph::db::Database;
use quest_graph::error::ToolError;
use quest_graph::notify::{CollectingSink, SubscriptionManager};
use quest_graph::resources::ResourceHandler;
use quest_graph::tools::ToolHandler;
use rmcp::{
    ErrorData, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, Content, InitializeResult,
        ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, PaginatedRequestParams,
        ReadResourceRequestParams, ReadResourceResult, ResourceContents,
        ResourceUpdatedNotificationParam, ServerCapabilities, SubscribeRequestParams,
        UnsubscribeRequestParams,
    },
    service::RequestContext,
    transport::io::stdio,
};
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

/// MCP server handler.
#[derive(Clone)]
struct QuestGraphServer {
    tool_handler: Arc<ToolHandler>,
    resource_handler: Arc<ResourceHandler>,
    /// Resource URIs the client asked to hear about.
    subscriptions: Arc<SubscriptionManager>,
}

impl QuestGraphServer {
    fn new(db: Arc<Database>, config: &Config) -> Self {
        Self {
            tool_handler: Arc::new(ToolHandler::new(Arc::clone(&db), config.engine())),
            resource_handler: Arc::new(ResourceHandler::new(db)),
            subscriptions: Arc::new(SubscriptionManager::new()),
        }
    }
}

const INSTRUCTIONS: &str = "\
Quest graph: quests own a head post and a task tree of addressed posts. \
Start: create_quest() \u{2192} create_post(type=\"task\", quest_id, parent_id) \u{2192} complete_quest(). \
Subscribe to quests://<id> to be told when a quest changes.";

impl ServerHandler for QuestGraphServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: Default::default(),
            server_info: rmcp::model::Implementation {
                name: "quest-graph".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            capabilities: ServerCapabilities {
                tools: Some(rmcp::model::ToolsCapability::default()),
                resources: Some(rmcp::model::ResourcesCapability {
                    subscribe: Some(Default::default()),
                    list_changed: None,
                }),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn subscribe(
        &self,
        request: SubscribeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        let uri = request.uri;
        if self.subscriptions.subscribe(&uri) {
            info!(uri = %uri, "Client subscribed to resource");
        } else {
            debug!(uri = %uri, "Client re-subscribed to resource (already subscribed)");
        }
        Ok(())
    }

    async fn unsubscribe(
        &self,
        request: UnsubscribeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        let uri = request.uri;
        if self.subscriptions.unsubscribe(&uri) {
            info!(uri = %uri, "Client unsubscribed from resource");
        } else {
            debug!(uri = %uri, "Client unsubscribed from resource (was not subscribed)");
        }
        Ok(())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_handler.get_tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let tool_name = request.name.to_string();
        let start = std::time::Instant::now();

        let sink = CollectingSink::new();
        let args = Value::Object(request.arguments.unwrap_or_default());
        match self.tool_handler.call_tool(&tool_name, args, &sink) {
            Ok(result) => {
                let elapsed = start.elapsed();
                let changes = sink.drain();
                debug!(
                    tool = %tool_name,
                    changed = changes.len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Tool call succeeded"
                );

                let affected = self.subscriptions.affected_subscriptions(&changes);
                if !affected.is_empty() {
                    let peer = context.peer.clone();
                    tokio::spawn(async move {
                        for uri in affected {
                            debug!(uri = %uri, tool = %tool_name, "Sending resource updated notification");
                            let param = ResourceUpdatedNotificationParam { uri };
                            if let Err(e) = peer.notify_resource_updated(param).await {
                                warn!(error = %e, "Failed to send resource notification");
                            }
                        }
                    });
                }

                Ok(CallToolResult {
                    content: vec![Content::text(result.to_string())],
                    is_error: None,
                    meta: None,
                    structured_content: None,
                })
            }
            Err(e) => {
                let elapsed = start.elapsed();
                let error_json = match e.downcast::<ToolError>() {
                    Ok(tool_err) => {
                        warn!(
                            tool = %tool_name,
                            error_code = ?tool_err.code,
                            error_message = %tool_err.message,
                            duration_ms = elapsed.as_millis() as u64,
                            "Tool call failed"
                        );
                        serde_json::to_string(&tool_err).unwrap_or_else(|_| {
                            json!({ "error": tool_err.to_string() }).to_string()
                        })
                    }
                    Err(e) => {
                        warn!(
                            tool = %tool_name,
                            error = %e,
                            duration_ms = elapsed.as_millis() as u64,
                            "Tool call failed with internal error"
                        );
                        let tool_err = ToolError::from(e);
                        json!({
                            "code": tool_err.code,
                            "message": tool_err.message
                        })
                        .to_string()
                    }
                };
                Ok(CallToolResult {
                    content: vec![Content::text(error_json)],
                    is_error: Some(true),
                    meta: None,
                    structured_content: None,
                })
            }
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult {
            resources: self.resource_handler.get_resources(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourceTemplatesResult, ErrorData> {
        Ok(ListResourceTemplatesResult {
            resource_templates: self.resource_handler.get_resource_templates(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ReadResourceResult, ErrorData> {
        let uri_string = request.uri.to_string();
        match self.resource_handler.read_resource(&uri_string) {
            Ok(result) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(
                    serde_json::to_string_pretty(&result).unwrap_or_default(),
                    request.uri,
                )],
            }),
            Err(e) => {
                warn!(
                    resource_uri = %uri_string,
                    error = %e,
                    "Resource read failed"
                );
                Err(ErrorData::resource_not_found(
                    format!("Unknown resource: {}", uri_string),
                    Some(json!({ "error": e.to_string() })),
                ))
            }
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut config = Config::discover(cli.config.as_deref().map(Path::new))?;
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }

    match cli.command {
        Some(Command::Check(args)) => run_check(&config, args),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Validate stored task graphs. Exits non-zero when any violation is found.
fn run_check(config: &Config, args: CheckArgs) -> Result<()> {
    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)?;
    let found = db.check_graph(args.quest.as_deref())?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": found.is_empty(),
            "quests": found
        }))?
    );

    if !found.is_empty() {
        warn!(quests = found.len(), "Task graph violations found");
        std::process::exit(1);
    }
    Ok(())
}

/// Run the MCP server
async fn run_server(config: Config) -> Result<()> {
    config.ensure_db_dir()?;

    info!(
        "Starting Quest Graph MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Database: {:?}", config.server.db_path);
    info!("Addressing: {:?}", config.addressing.mode);

    let db = Arc::new(Database::open(&config.server.db_path)?);
    info!("Database initialized successfully");

    let server = QuestGraphServer::new(db, &config);

    info!("Server ready, listening on stdio");
    let transport = stdio();
    let service = server.serve(transport).await?;
    service.waiting().await?;

    Ok(())
}
