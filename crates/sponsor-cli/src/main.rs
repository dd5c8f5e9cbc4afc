//! sponsorctl: run sponsored token transfers against a Solana RPC node.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chain_sol::Address;
use clap::Parser;
use sponsor_core::{
    init_logging, ExternalSigner, HttpSigner, HttpSponsorLookup, Participants, RpcLedger,
    SignRequest, SignResponse, SignerError, SponsorLookup, SponsoredTransfer, StaticWallet,
    TransferConfig, TransferRequest,
};

#[derive(Parser)]
#[command(name = "sponsorctl", about = "Sponsored SPL token transfers")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Solana JSON-RPC endpoint.
    #[arg(long, env = "SPONSOR_RPC_URL")]
    rpc_url: Option<String>,

    /// Mint of the token being moved.
    #[arg(long, env = "SPONSOR_TOKEN_MINT")]
    mint: Option<String>,

    /// Decimal places of the mint.
    #[arg(long, env = "SPONSOR_TOKEN_DECIMALS")]
    decimals: Option<u8>,

    /// Endpoint of the sender's signer.
    #[arg(long, env = "SPONSOR_SENDER_SIGNER_URL")]
    sender_signer_url: Option<String>,

    /// Endpoint of the sponsor's signer.
    #[arg(long, env = "SPONSOR_SPONSOR_SIGNER_URL")]
    sponsor_signer_url: Option<String>,

    /// Endpoint returning the sponsor's address.
    #[arg(long, env = "SPONSOR_LOOKUP_URL")]
    sponsor_lookup_url: Option<String>,

    /// Credential for the sponsor endpoints.
    #[arg(long, env = "SPONSOR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "SPONSOR_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "SPONSOR_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print an owner's total balance of the configured mint.
    Balance { owner: String },

    /// Create an owner's token account at the sponsor's expense if missing.
    EnsureAccount {
        owner: String,
        /// Sponsor address. Looked up from --sponsor-lookup-url if omitted.
        #[arg(long)]
        sponsor: Option<String>,
    },

    /// Move tokens with the network fee paid by the sponsor.
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Amount in whole tokens, e.g. "0.01".
        #[arg(long)]
        amount: String,
        /// Sponsor address. Looked up from --sponsor-lookup-url if omitted.
        #[arg(long)]
        sponsor: Option<String>,
    },
}

/// Stands in for a signer endpoint the command does not need.
struct NotConfigured(&'static str);

#[async_trait]
impl ExternalSigner for NotConfigured {
    async fn sign(&self, _request: SignRequest) -> Result<SignResponse, SignerError> {
        Err(SignerError::Transport(format!("{} is not configured", self.0)))
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<TransferConfig> {
    let mut config = match &cli.config {
        Some(path) => TransferConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let (Some(rpc_url), Some(mint)) = (&cli.rpc_url, &cli.mint) else {
                bail!("--rpc-url and --mint are required without --config");
            };
            TransferConfig::new(rpc_url, mint)
        }
    };

    if let Some(v) = &cli.rpc_url {
        config.rpc_url = v.clone();
    }
    if let Some(v) = &cli.mint {
        config.token_mint = v.clone();
    }
    if let Some(v) = cli.decimals {
        config.token_decimals = v;
    }
    if cli.sender_signer_url.is_some() {
        config.sender_signer_url = cli.sender_signer_url.clone();
    }
    if cli.sponsor_signer_url.is_some() {
        config.sponsor_signer_url = cli.sponsor_signer_url.clone();
    }
    if cli.sponsor_lookup_url.is_some() {
        config.sponsor_lookup_url = cli.sponsor_lookup_url.clone();
    }
    if cli.api_key.is_some() {
        config.sponsor_api_key = cli.api_key.clone();
    }
    if let Some(v) = &cli.log_format {
        config.log_format = v.clone();
    }
    if let Some(v) = &cli.log_level {
        config.log_level = v.clone();
    }

    config.validate()?;
    Ok(config)
}

fn signer(
    config: &TransferConfig,
    url: Option<&String>,
    api_key: Option<String>,
    name: &'static str,
) -> anyhow::Result<Arc<dyn ExternalSigner>> {
    let signer: Arc<dyn ExternalSigner> = match url {
        Some(url) => Arc::new(HttpSigner::new(url.clone(), api_key, config.signer_timeout())?),
        None => Arc::new(NotConfigured(name)),
    };
    Ok(signer)
}

/// A fixed sponsor when one is given, otherwise the configured lookup.
fn sponsor_lookup(
    config: &TransferConfig,
    given: Option<&str>,
) -> anyhow::Result<Box<dyn SponsorLookup>> {
    if let Some(address) = given {
        return Ok(Box::new(StaticWallet(address.parse()?)));
    }
    let Some(url) = &config.sponsor_lookup_url else {
        bail!("pass --sponsor or configure a sponsor lookup URL");
    };
    Ok(Box::new(HttpSponsorLookup::new(
        url.clone(),
        config.sponsor_api_key.clone(),
        config.rpc_timeout(),
    )?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(config.log_format()?, &config.log_level);
    tracing::debug!(?config, "configuration loaded");

    let ledger = Arc::new(RpcLedger::from_config(&config)?);
    let sender_signer = signer(
        &config,
        config.sender_signer_url.as_ref(),
        None,
        "sender signer",
    )?;
    let sponsor_signer = signer(
        &config,
        config.sponsor_signer_url.as_ref(),
        config.sponsor_api_key.clone(),
        "sponsor signer",
    )?;
    let config = Arc::new(config);
    let transfers = SponsoredTransfer::new(config.clone(), ledger, sender_signer, sponsor_signer)?;

    match cli.command {
        Command::Balance { owner } => {
            let owner: Address = owner.parse()?;
            let balance = transfers.balance_of(&owner).await?;
            println!("{owner}: {balance}");
        }

        Command::EnsureAccount { owner, sponsor } => {
            let owner: Address = owner.parse()?;
            let sponsor = sponsor_lookup(&config, sponsor.as_deref())?
                .sponsor_address()
                .await?;
            match transfers.ensure_account(&owner, &sponsor).await? {
                Some(id) => println!("created token account for {owner}: {id}"),
                None => println!("token account for {owner} already exists"),
            }
        }

        Command::Transfer {
            from,
            to,
            amount,
            sponsor,
        } => {
            let sender: Address = from.parse()?;
            let lookup = sponsor_lookup(&config, sponsor.as_deref())?;
            let (sender, sponsor) = match transfers
                .resolve_participants(&StaticWallet(sender), lookup.as_ref())
                .await?
            {
                Participants::Ready { sender, sponsor } => (sender, sponsor),
                Participants::Cancelled => {
                    println!("cancelled");
                    return Ok(());
                }
            };

            let request = TransferRequest::parse(
                &sender.to_string(),
                &to,
                &sponsor.to_string(),
                *transfers.mint(),
                &amount,
                config.token_decimals,
            )?;

            match transfers.execute(&request).await {
                Ok(receipt) => {
                    if let Some(setup) = receipt.setup_transaction_id {
                        println!("setup: {setup}");
                    }
                    println!("transfer: {}", receipt.transaction_id);
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!("transfer failed but can be retried from the start");
                    }
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
