use clap::Parser;
use sip_registrar::{
    utils, Aor, ContactEntry, DbImplementation, MemoryKvStore, Record, RegisterRequest,
    RegistrarConfig, RegistrarDb, RemoteStores,
};
use std::sync::Arc;

use tracing::{error, info};

/// SIP Registrar CLI Application
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Registrar db implementation (internal/redis-sync/redis-async)
    #[arg(long, env = "REGISTRAR_DB_IMPLEMENTATION", default_value = "internal")]
    db_implementation: String,

    /// Maximum contacts kept per address-of-record
    #[arg(long, env = "REGISTRAR_MAX_CONTACTS_BY_AOR", default_value_t = 12)]
    max_contacts_by_aor: usize,

    /// Contact parameter used for replace-by-line (empty disables)
    #[arg(long, env = "REGISTRAR_LINE_FIELD_NAME", default_value = "")]
    line_field_name: String,

    /// Maximum alias recursion depth
    #[arg(long, default_value_t = 1)]
    max_recursion_depth: u32,

    /// Address of record (e.g., sip:alice@example.com)
    #[arg(short, long)]
    aor: Option<String>,

    /// Contact to bind, repeatable (e.g., "sip:alice@192.0.2.1:5060;expires=3600")
    #[arg(short, long)]
    contact: Vec<String>,

    /// Call-ID of the REGISTER (generated when omitted)
    #[arg(long)]
    call_id: Option<String>,

    /// CSeq of the REGISTER
    #[arg(long, default_value_t = 1)]
    cseq: u32,

    /// Default expiration in seconds for contacts without expires
    #[arg(short, long, default_value_t = 3600)]
    expires: i64,

    /// Operation mode (bind/resolve)
    #[arg(short, long, default_value = "bind")]
    mode: String,

    /// Resolve target AOR: in resolve mode the AOR is bound as alias to it
    #[arg(short, long)]
    target: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    utils::initialize_logging(args.log_level.as_str());

    let db = build_registrar(&args)?;
    info!("Registrar ready: {:?}", db);

    match args.mode.as_str() {
        "bind" => run_bind_mode(&db, &args).await,
        "resolve" => run_resolve_mode(&db, &args).await,
        _ => {
            eprintln!("Invalid mode. Use 'bind' or 'resolve'");
            Ok(())
        }
    }
}

fn build_registrar(args: &Args) -> Result<RegistrarDb, Box<dyn std::error::Error>> {
    let db_implementation: DbImplementation = args.db_implementation.parse()?;
    let config = RegistrarConfig::new(db_implementation, args.max_contacts_by_aor)
        .with_line_field_name(args.line_field_name.as_str())
        .with_max_recursion_depth(args.max_recursion_depth);

    // 远程后端在命令行中以进程内存储代替
    let stores = RemoteStores::memory(Arc::new(MemoryKvStore::new()));
    Ok(RegistrarDb::new(&config, stores)?)
}

fn build_request(
    aor: &Aor,
    contacts: &[String],
    call_id: Option<&str>,
    cseq: u32,
) -> Result<RegisterRequest, Box<dyn std::error::Error>> {
    let call_id = call_id
        .map(str::to_string)
        .unwrap_or_else(|| utils::make_call_id(Some(aor.host.as_str())));
    let mut request = RegisterRequest::new(aor.clone(), call_id, cseq);
    for contact in contacts {
        request = request.with_contact(ContactEntry::parse(contact)?);
    }
    Ok(request)
}

async fn run_bind_mode(db: &RegistrarDb, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let aor: Aor = args
        .aor
        .clone()
        .or_else(|| std::env::var("REGISTRAR_AOR").ok())
        .ok_or("AOR is required")?
        .parse()?;

    if args.contact.is_empty() {
        return Err("at least one --contact is required in bind mode".into());
    }

    let request = build_request(&aor, &args.contact, args.call_id.as_deref(), args.cseq)?;
    match db.bind_record(request, None, args.expires, false).await {
        Ok(record) => print_record(&record),
        Err(e) => {
            error!("Bind failed: {}", e);
            error!("Error code: {}", e.error_code());
            return Err(format!("Bind failed: {}", e).into());
        }
    }

    match db.fetch_record(&aor, false).await? {
        Some(record) => info!("Fetched {} with {} contacts", record.aor(), record.len()),
        None => info!("No record for {}", aor.key()),
    }
    Ok(())
}

async fn run_resolve_mode(db: &RegistrarDb, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let aor: Aor = args.aor.as_deref().ok_or("AOR is required")?.parse()?;
    let target: Aor = args
        .target
        .as_deref()
        .ok_or("Resolve target is required in resolve mode")?
        .parse()?;

    let alias_request = build_request(&aor, &[target.to_string()], None, 1)?;
    db.bind_record(alias_request, None, args.expires, true).await?;
    info!("{} bound as alias of {}", aor.key(), target.key());

    if !args.contact.is_empty() {
        let request = build_request(&target, &args.contact, args.call_id.as_deref(), args.cseq)?;
        db.bind_record(request, None, args.expires, false).await?;
    }

    match db.fetch_record(&aor, true).await {
        Ok(Some(record)) => print_record(&record),
        Ok(None) => println!("{}: not found", aor.key()),
        Err(e) => {
            error!("Resolve failed: {}", e);
            return Err(format!("Resolve failed: {}", e).into());
        }
    }
    Ok(())
}

fn print_record(record: &Record) {
    println!("{}:", record.aor());
    for contact in record.get_contacts(utils::unix_now()) {
        println!("  Contact: {}", contact);
    }
}
