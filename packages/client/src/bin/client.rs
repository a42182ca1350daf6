//! Interactive queue session client.
//!
//! Signs in with a stored (or given) credential, keeps the realtime session
//! alive and exposes the queue commands at a prompt.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin qure-client -- --user-id p1 --access-token <jwt> --refresh-token <token>
//! cargo run --bin qure-client -- --role staff --user-id s1 --clinic-id clinicA -f creds.json
//! ```

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, ValueEnum};

use qure_client::{
    SessionConfig, build_session,
    domain::{
        AccessToken, ClinicId, Credential, CredentialStore, RefreshToken, Role, UserId,
        UserIdentity,
    },
    infrastructure::credential_store::{FileCredentialStore, InMemoryCredentialStore},
    ui::{ClientError, run_client},
};
use qure_shared::logger::setup_logger;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Patient,
    Staff,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Patient => Role::Patient,
            RoleArg::Staff => Role::Staff,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "qure-client")]
#[command(about = "Real-time clinic queue client for patients and staff", long_about = None)]
struct Args {
    /// REST API base URL
    #[arg(long, default_value = qure_client::config::DEFAULT_API_BASE_URL)]
    api_url: String,

    /// WebSocket endpoint
    #[arg(long, default_value = qure_client::config::DEFAULT_WS_URL)]
    ws_url: String,

    /// Who is signing in
    #[arg(short, long, value_enum, default_value_t = RoleArg::Patient)]
    role: RoleArg,

    /// Signed-in user id
    #[arg(short, long)]
    user_id: String,

    /// Clinic of a staff/admin user
    #[arg(short, long)]
    clinic_id: Option<String>,

    /// JSON file holding the credential pair
    #[arg(short = 'f', long)]
    credentials: Option<PathBuf>,

    /// Access token to seed the credential store with
    #[arg(long, requires = "refresh_token")]
    access_token: Option<String>,

    /// Refresh token to seed the credential store with
    #[arg(long, requires = "access_token")]
    refresh_token: Option<String>,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    if let Err(e) = run(args).await {
        tracing::error!("Client error: {}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let identity = identity(&args)?;
    let credentials = credential_store(&args).await?;

    let config = SessionConfig {
        api_base_url: args.api_url,
        ws_url: args.ws_url,
        ..SessionConfig::default()
    };
    let session = build_session(&config, credentials).map_err(ClientError::from)?;
    run_client(Arc::new(session), identity).await?;
    Ok(())
}

fn identity(args: &Args) -> Result<UserIdentity, Box<dyn std::error::Error>> {
    let user_id = UserId::new(args.user_id.as_str())?;
    let role = Role::from(args.role);
    if !role.is_staff() {
        return Ok(UserIdentity::patient(user_id));
    }

    let clinic_id = args
        .clinic_id
        .as_deref()
        .ok_or("--clinic-id is required for staff and admin")?;
    let mut identity = UserIdentity::staff(user_id, ClinicId::new(clinic_id)?);
    identity.role = role;
    Ok(identity)
}

async fn credential_store(
    args: &Args,
) -> Result<Arc<dyn CredentialStore>, Box<dyn std::error::Error>> {
    let store: Arc<dyn CredentialStore> = match &args.credentials {
        Some(path) => Arc::new(FileCredentialStore::new(path)),
        None => Arc::new(InMemoryCredentialStore::new()),
    };

    if let (Some(access), Some(refresh)) = (&args.access_token, &args.refresh_token) {
        let credential = Credential::new(
            AccessToken::new(access.as_str())?,
            RefreshToken::new(refresh.as_str())?,
        );
        store.save(&credential).await?;
    }
    Ok(store)
}
