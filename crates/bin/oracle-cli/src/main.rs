//! oracle CLI
//!
//! ## Usage
//!
//! ```bash
//! # pack a question into a field element and back
//! oracle-cli encode "What's the ratio for fernet?"
//! oracle-cli decode 0x5768617427...
//!
//! # show the deployment picked up from ORACLE / TOKEN / FEE / TX_HASH
//! oracle-cli config --settings oracle.json
//!
//! # ask, answer and cancel against the in-memory sandbox
//! oracle-cli demo --strategy storage-scan --collapse collapse-resolved
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crux_core::App;
use tracing::info;

use oracle_core::app::{DEFAULT_ANSWER, DEFAULT_QUESTION};
use oracle_core::codec::{field_hex, parse_field};
use oracle_core::config::{ENV_FEE, ENV_ORACLE, ENV_TOKEN, ENV_TX_HASH, MINT_AMOUNT};
use oracle_core::{
    decode_text, deploy, encode_text, short_address, Address, CollapsePolicy, Collaborators,
    DeploymentConfig, DeploymentState, Event, Model, OracleApp, OracleSession, OracleSettings,
    Sandbox, SlotLayout, SourceStrategy, ViewModel,
};

#[derive(Parser)]
#[command(name = "oracle-cli")]
#[command(about = "private question/answer oracle client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack text (at most 31 bytes) into a field element
    Encode {
        text: String,
    },

    /// Unpack a field element (0x hex or decimal) into text
    Decode {
        value: String,
    },

    /// Shorten an address for display
    Short {
        address: String,
    },

    /// Show deployment state and client settings
    Config {
        /// Oracle contract address
        #[arg(long, env = ENV_ORACLE)]
        oracle: Option<String>,

        /// Payment token address
        #[arg(long, env = ENV_TOKEN)]
        token: Option<String>,

        /// Question fee
        #[arg(long, env = ENV_FEE)]
        fee: Option<String>,

        /// Deployment transaction hash
        #[arg(long, env = ENV_TX_HASH)]
        tx_hash: Option<String>,

        /// Settings file (JSON)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// Walk through deploy, ask, answer and cancel on an in-memory network
    Demo {
        /// Question fee
        #[arg(long, default_value_t = oracle_core::config::DEFAULT_FEE)]
        fee: u64,

        /// How records are read
        #[arg(long, value_enum, default_value = "contract-query")]
        strategy: StrategyArg,

        /// Duplicate request id handling
        #[arg(long, value_enum, default_value = "keep-both")]
        collapse: CollapseArg,

        /// How often the divinity re-reads records (ms)
        #[arg(long, default_value_t = 250)]
        refresh_poll_ms: u64,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        output: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    StorageScan,
    ContractQuery,
    LegacyHybrid,
}

impl StrategyArg {
    fn into_strategy(self, layout: SlotLayout) -> SourceStrategy {
        match self {
            StrategyArg::StorageScan => SourceStrategy::StorageScan { layout },
            StrategyArg::ContractQuery => SourceStrategy::contract_query(),
            StrategyArg::LegacyHybrid => SourceStrategy::LegacyHybrid { layout },
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CollapseArg {
    KeepBoth,
    CollapseResolved,
}

impl From<CollapseArg> for CollapsePolicy {
    fn from(arg: CollapseArg) -> Self {
        match arg {
            CollapseArg::KeepBoth => CollapsePolicy::KeepBoth,
            CollapseArg::CollapseResolved => CollapsePolicy::CollapseResolved,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oracle_cli=info,oracle_core=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode { text } => {
            let value = encode_text(&text)?;
            println!("{}", field_hex(value));
            println!("{}", value);
            Ok(())
        }
        Commands::Decode { value } => {
            let value = parse_field(&value)?;
            println!("{}", decode_text(value));
            Ok(())
        }
        Commands::Short { address } => {
            println!("{}", short_address(&address));
            Ok(())
        }
        Commands::Config {
            oracle,
            token,
            fee,
            tx_hash,
            settings,
        } => run_config(oracle, token, fee, tx_hash, settings),
        Commands::Demo {
            fee,
            strategy,
            collapse,
            refresh_poll_ms,
            output,
        } => run_demo(fee, strategy, collapse, refresh_poll_ms, output).await,
    }
}

fn run_config(
    oracle: Option<String>,
    token: Option<String>,
    fee: Option<String>,
    tx_hash: Option<String>,
    settings: Option<PathBuf>,
) -> Result<()> {
    let deployment = DeploymentConfig::from_lookup(|key| match key {
        ENV_ORACLE => oracle.clone(),
        ENV_TOKEN => token.clone(),
        ENV_FEE => fee.clone(),
        ENV_TX_HASH => tx_hash.clone(),
        _ => None,
    })?;
    let state = DeploymentState::from_config(deployment);

    let settings = match settings {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            OracleSettings::from_json(&json)?
        }
        None => OracleSettings::default(),
    };

    let out = serde_json::json!({
        "deployed": state.is_deployed(),
        "deployment": state,
        "settings": settings,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run_demo(
    fee: u64,
    strategy: StrategyArg,
    collapse: CollapseArg,
    refresh_poll_ms: u64,
    output: String,
) -> Result<()> {
    let layout = SlotLayout::with_owner();
    let settings = OracleSettings {
        strategy: strategy.into_strategy(layout),
        collapse: collapse.into(),
        default_fee: fee,
        refresh_poll_ms: Some(refresh_poll_ms),
        ..Default::default()
    };
    info!("sandbox demo via {}", settings.strategy.name());

    let sandbox = Sandbox::new(layout);
    let alice = sandbox.wallet(Address::random());
    let bob = sandbox.wallet(Address::random());

    let mut state = DeploymentState::default();
    let config = deploy(&alice, &alice.address(), settings.default_fee, &mut state).await?;

    let requester = OracleSession::new(
        alice.address(),
        &state,
        Collaborators::from_wallet(alice.clone()),
        &settings,
    )?;
    let divinity = Arc::new(OracleSession::new(
        bob.address(),
        &state,
        Collaborators::from_wallet(bob.clone()),
        &settings,
    )?);
    let pollers = divinity.start_pollers(&settings);

    // two questions' worth of fees
    let needed = u128::from(fee) * 2;
    let mut minted = 0u128;
    while minted < needed || minted == 0 {
        requester.mint().await?;
        minted += MINT_AMOUNT;
    }

    let minted_notice = format!("minted {} tokens to {}", minted, requester.viewer().short());

    requester.ask(DEFAULT_QUESTION, bob.address()).await?;
    let request_id = encode_text(DEFAULT_QUESTION)?;
    let poll = settings.refresh_poll_interval().unwrap_or(Duration::from_millis(250));
    let question = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(row) = divinity.row(request_id).filter(|r| r.can_answer()) {
                return row;
            }
            tokio::time::sleep(poll).await;
        }
    })
    .await
    .context("question not visible to the divinity")?;
    divinity
        .answer(question.request_id, question.requester, DEFAULT_ANSWER)
        .await?;

    let withdrawn = "never mind?";
    requester.ask(withdrawn, bob.address()).await?;
    requester.cancel(encode_text(withdrawn)?).await?;
    requester.refresh().await?;
    divinity.refresh().await?;
    pollers.stop().await;

    let requester_view = render(&requester, Some(config), Some(minted_notice)).await?;
    let divinity_view = render(&divinity, Some(config), None).await?;

    if output == "json" {
        let out = serde_json::json!({
            "requester": requester_view,
            "divinity": divinity_view,
            "escrow": sandbox.escrow().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_view("requester", &requester_view);
        print_view("divinity", &divinity_view);
        println!("escrow: {}", sandbox.escrow());
    }

    Ok(())
}

/// feed a session's state through the crux core
async fn render(
    session: &OracleSession,
    deployment: Option<DeploymentConfig>,
    notice: Option<String>,
) -> Result<ViewModel> {
    let app = OracleApp;
    let mut model = Model::default();
    let mut events = vec![
        Event::Init {
            viewer: *session.viewer(),
            deployment,
        },
        Event::RowsLoaded {
            rows: session.rows().to_vec(),
        },
        Event::BalancesUpdated {
            balances: session.balances().await?,
        },
    ];
    if let Some(message) = notice {
        events.push(Event::Notice { message });
    }
    for event in events {
        let _ = app.update(event, &mut model, &());
    }
    Ok(app.view(&model))
}

fn print_view(label: &str, view: &ViewModel) {
    println!(
        "{} {} (private {}, public {})",
        label,
        view.viewer.as_deref().unwrap_or("-"),
        view.private_balance,
        view.public_balance
    );
    if let Some(popup) = &view.popup {
        println!("  [{}]", popup.message);
    }
    for row in &view.rows {
        println!(
            "  {:<30} {:<20} {} -> {} {}",
            row.question,
            row.answer,
            row.requester,
            row.divinity,
            row.action.as_deref().unwrap_or("")
        );
    }
}
