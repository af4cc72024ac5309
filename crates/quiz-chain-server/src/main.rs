//! quiz-chain-server: entry point.

use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use quiz_chain::{submit_answer, ChallengeTask, GeminiClient, HttpClient, SubmissionPayload};
use quiz_chain_server::config::{resolve_bind, resolve_model, API_KEY_ENV};
use quiz_chain_server::{
    build_controller, resolve_api_key, router, IntakeState, RendererKind, ServerConfig,
};

#[derive(Parser)]
#[command(
    name = "quiz-chain-server",
    about = "Solve chained web quiz challenges: HTTP job intake and foreground tools",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Settings shared by every command that runs chains.
#[derive(clap::Args, Default)]
struct ChainArgs {
    /// Reasoning-service API key.
    /// Also reads from GOOGLE_API_KEY env var.
    #[arg(long)]
    api_key: Option<String>,

    /// Reasoning model. Also reads QUIZ_CHAIN_MODEL (default gemini-2.5-flash).
    #[arg(long)]
    model: Option<String>,

    /// How pages are rendered. `http` reads static markup only, so pages
    /// whose content is built by script render empty; `chromium` runs a
    /// headless browser. Defaults to `chromium` in builds with that feature.
    #[arg(long, value_enum)]
    renderer: Option<RendererKind>,

    /// Most challenges one chain may solve (default 50).
    #[arg(long)]
    max_hops: Option<usize>,

    /// Per-request HTTP timeout in seconds (default 10).
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Step budget of each script (default 1000000).
    #[arg(long)]
    max_steps: Option<u64>,
}

impl ChainArgs {
    fn into_config(self, bind: Option<&str>) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            bind: resolve_bind(bind),
            api_key: resolve_api_key(self.api_key.as_deref()),
            model: resolve_model(self.model.as_deref()),
            renderer: self.renderer.unwrap_or(defaults.renderer),
            max_hops: self.max_hops.unwrap_or(defaults.max_hops),
            http_timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Accept quiz jobs over HTTP (default).
    Serve {
        /// Listen address (host:port). Also reads QUIZ_CHAIN_BIND.
        #[arg(long)]
        bind: Option<String>,

        #[command(flatten)]
        chain: ChainArgs,
    },

    /// Run one chain in the foreground and print its report as JSON.
    Solve {
        /// First challenge page.
        #[arg(long)]
        url: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        secret: String,

        #[command(flatten)]
        chain: ChainArgs,
    },

    /// Post one answer to a submission endpoint and print the reply.
    Submit {
        /// Submission endpoint.
        #[arg(long)]
        endpoint: String,

        /// Challenge page being answered.
        #[arg(long)]
        url: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        secret: String,

        /// Answer, as JSON if it parses (`42`, `true`, `[1,2]`), else as a string.
        #[arg(long)]
        answer: String,
    },

    /// List reasoning models that support content generation.
    Models {
        /// Also reads from GOOGLE_API_KEY env var.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   quiz-chain-server completions bash > ~/.local/share/bash-completion/completions/quiz-chain-server
    ///   quiz-chain-server completions zsh > ~/.zfunc/_quiz-chain-server
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        bind: None,
        chain: ChainArgs::default(),
    }) {
        Commands::Serve { bind, chain } => {
            let config = chain.into_config(bind.as_deref());
            let controller = build_controller(&config).await?;
            if controller.is_none() {
                tracing::warn!("No API key ({API_KEY_ENV}); /webhook will answer 503");
            }

            let listener = tokio::net::TcpListener::bind(&config.bind)
                .await
                .with_context(|| format!("cannot listen on {}", config.bind))?;
            tracing::info!("Quiz intake listening on {}", config.bind);
            axum::serve(listener, router(IntakeState::new(controller))).await?;
        }

        Commands::Solve {
            url,
            email,
            secret,
            chain,
        } => {
            let config = chain.into_config(None);
            let controller = build_controller(&config)
                .await?
                .with_context(|| format!("No API key: pass --api-key or set {API_KEY_ENV}"))?;

            let report = controller.run(ChallengeTask::new(url, email, secret)).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                std::process::exit(1);
            }
        }

        Commands::Submit {
            endpoint,
            url,
            email,
            secret,
            answer,
        } => {
            let answer = serde_json::from_str(&answer)
                .unwrap_or_else(|_| serde_json::Value::String(answer.clone()));
            let payload = SubmissionPayload {
                email,
                secret,
                url,
                answer,
            };
            let response = submit_answer(&HttpClient::default(), &endpoint, &payload).await?;
            println!("{}", serde_json::to_string_pretty(&response.raw)?);
        }

        Commands::Models { api_key } => {
            let api_key = resolve_api_key(api_key.as_deref())
                .with_context(|| format!("No API key: pass --api-key or set {API_KEY_ENV}"))?;
            let client = GeminiClient::new(api_key, resolve_model(None));
            let models = client.list_models().await?;
            if models.is_empty() {
                eprintln!("No models support content generation for this key.");
            }
            for model in models {
                println!("{}\t{}", model.name, model.display_name);
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "quiz-chain-server", &mut std::io::stdout());
        }
    }

    Ok(())
}
