// FuelEU Compliance - command line
//
// Opens the SQLite store named by config (--config, FUEL_COMPLIANCE_DB, --db)
// and runs one operation against it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fuel_compliance::{
    import_routes, load_routes_csv, seed_routes, AppConfig, ComplianceEngine, PoolCreationRequest,
    PoolMemberRequest, RouteFilter, SqliteStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "FuelEU compliance balance, banking and pooling", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long, global = true, default_value = "compliance.toml")]
    config: PathBuf,

    /// SQLite database (overrides config and FUEL_COMPLIANCE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import routes from CSV and record each ship's CB
    Import { csv: PathBuf },

    /// Load the five reference routes
    Seed,

    /// Compute and store a compliance balance
    Record {
        #[arg(long)]
        ship: String,
        #[arg(long)]
        year: i32,
        /// Fuel consumption (tonnes)
        #[arg(long)]
        fuel: f64,
        /// Actual GHG intensity (gCO₂e/MJ)
        #[arg(long)]
        intensity: f64,
        /// Target intensity, config default when omitted
        #[arg(long)]
        target: Option<f64>,
    },

    /// Show a ship's CB and bank record
    Cb {
        #[arg(long)]
        ship: String,
        #[arg(long)]
        year: i32,
    },

    /// Bank positive CB
    Bank {
        #[arg(long)]
        ship: String,
        #[arg(long)]
        year: i32,
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,
        #[arg(long)]
        description: Option<String>,
    },

    /// Apply banked surplus
    Apply {
        #[arg(long)]
        ship: String,
        #[arg(long)]
        year: i32,
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,
        #[arg(long)]
        description: Option<String>,
    },

    /// Create a pool: --member SHIP=ADJUSTED_CB (repeatable)
    Pool {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "member", value_parser = parse_member, required = true)]
        members: Vec<PoolMemberRequest>,
        /// Validate only, persist nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// List pools of a year
    Pools {
        #[arg(long)]
        year: i32,
    },

    /// Mark a route as the comparison baseline
    Baseline { route_id: String },

    /// Compare routes against the baseline
    Compare {
        #[arg(long)]
        vessel_type: Option<String>,
        #[arg(long)]
        fuel_type: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },
}

fn parse_member(raw: &str) -> std::result::Result<PoolMemberRequest, String> {
    let (ship_id, cb) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SHIP=ADJUSTED_CB, got '{}'", raw))?;
    let adjusted_cb: f64 = cb
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", cb))?;
    Ok(PoolMemberRequest::new(ship_id.trim(), adjusted_cb))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(Some(args.config.as_path()))?;
    config.apply_env_overrides()?;
    if let Some(db) = &args.db {
        config.database.path = db.clone();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = SqliteStore::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    let engine = ComplianceEngine::with_calculator(Arc::new(store), config.calculator());

    run(&engine, args.cmd)
}

fn run(engine: &ComplianceEngine<SqliteStore>, cmd: Command) -> Result<()> {
    match cmd {
        Command::Import { csv } => {
            println!("📂 Loading routes from {}...", csv.display());
            let routes = load_routes_csv(&csv)?;
            println!("✓ Loaded {} routes from CSV", routes.len());

            let summary = import_routes(engine, &routes)?;
            println!(
                "✅ Imported {} routes ({} surplus, {} deficit)",
                summary.routes, summary.surplus_ships, summary.deficit_ships
            );
        }

        Command::Seed => {
            let summary = import_routes(engine, &seed_routes())?;
            println!("🌱 Seeded {} reference routes", summary.routes);
        }

        Command::Record {
            ship,
            year,
            fuel,
            intensity,
            target,
        } => {
            let balance = engine.record_balance(&ship, year, fuel, intensity, target)?;
            println!("✓ {} {}", balance.ship_id, balance.year);
            println!("  Energy in scope:    {:.0} MJ", balance.energy_in_scope);
            println!("  Compliance balance: {:.2} gCO₂e", balance.compliance_balance);
        }

        Command::Cb { ship, year } => {
            let balance = engine.get_balance(&ship, year)?;
            let record = engine.bank_record(&ship, year)?;

            let status = if balance.is_surplus() {
                "SURPLUS"
            } else if balance.is_deficit() {
                "DEFICIT"
            } else {
                "BALANCED"
            };

            println!("🚢 {} {}", ship, year);
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            println!("  Target intensity:   {:.4}", balance.target_intensity);
            println!("  Actual intensity:   {:.4}", balance.actual_intensity);
            println!("  Energy in scope:    {:.0} MJ", balance.energy_in_scope);
            println!("  Compliance balance: {:.2} ({})", balance.compliance_balance, status);
            println!("  Banked:             {:.2}", record.total_banked);
            println!("  Applied:            {:.2}", record.total_applied);
            println!("  Available:          {:.2}", record.available_balance);
        }

        Command::Bank {
            ship,
            year,
            amount,
            description,
        } => {
            let entry = engine.bank(&ship, year, amount, description)?;
            println!("✅ Banked {:.2} for {} {} (entry {})", entry.cb_amount, ship, year, entry.id);
        }

        Command::Apply {
            ship,
            year,
            amount,
            description,
        } => {
            let entry = engine.apply(&ship, year, amount, description)?;
            let record = engine.bank_record(&ship, year)?;
            println!("✅ Applied {:.2} for {} {} (entry {})", -entry.cb_amount, ship, year, entry.id);
            println!("  Remaining banked: {:.2}", record.available_balance);
        }

        Command::Pool {
            year,
            name,
            members,
            dry_run,
        } => {
            let request = PoolCreationRequest {
                name,
                year,
                members,
            };

            let validation = if dry_run {
                engine.validate_pool_request(&request)?
            } else {
                match engine.create_pool(&request) {
                    Ok(outcome) => {
                        println!("✅ Pool {} created ({} members)", outcome.pool.id, outcome.pool.members.len());
                        outcome.validation
                    }
                    Err(err) if err.is_invalid_operation() && !err.details().is_empty() => {
                        println!("❌ {}", err);
                        for detail in err.details() {
                            println!("   - {}", detail);
                        }
                        return Err(err.into());
                    }
                    Err(err) => return Err(err.into()),
                }
            };

            println!("  {:<12} {:>18} {:>18}", "ship", "cb before", "cb after");
            for (ship_id, after) in &validation.cb_after {
                let before = validation.cb_before.get(ship_id).copied().unwrap_or(0.0);
                println!("  {:<12} {:>18.2} {:>18.2}", ship_id, before, after);
            }
            println!("  Pool sum after: {:.2}", validation.sum_after());

            if dry_run {
                if validation.valid {
                    println!("✓ Pool is valid");
                } else {
                    println!("❌ Pool is invalid");
                    for error in &validation.errors {
                        println!("   - {}", error);
                    }
                }
            }
        }

        Command::Pools { year } => {
            let pools = engine.list_pools(year)?;
            println!("🤝 {} pools in {}", pools.len(), year);
            for pool in pools {
                println!(
                    "  {} {}: {} members, total after {:.2}",
                    pool.id,
                    pool.name.as_deref().unwrap_or("(unnamed)"),
                    pool.members.len(),
                    pool.total_after()
                );
            }
        }

        Command::Baseline { route_id } => {
            let route = engine.set_baseline(&route_id)?;
            println!("✓ Baseline set: {} ({:.2} gCO₂e/MJ)", route.route_id, route.ghg_intensity);
        }

        Command::Compare {
            vessel_type,
            fuel_type,
            year,
        } => {
            let filter = RouteFilter {
                vessel_type,
                fuel_type,
                year,
            };
            let report = engine.compare(&filter)?;

            println!(
                "📊 Baseline {} ({:.2} gCO₂e/MJ)",
                report.baseline.route_id, report.baseline.ghg_intensity
            );
            for c in report.comparisons {
                println!(
                    "  {:<6} {:<12} {:<5} {} {:>8.2} {:>+8.2}% {}",
                    c.route_id,
                    c.vessel_type,
                    c.fuel_type,
                    c.year,
                    c.comparison,
                    c.percent_diff,
                    if c.compliant { "✅" } else { "❌" }
                );
            }
        }
    }

    Ok(())
}
