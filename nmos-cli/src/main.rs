#![forbid(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nmos_conformance::report::EXIT_ERROR;
use nmos_conformance::suites::{NodeRegistrationSuite, QueryPagingSuite, Target, Tr08ControllerSuite, SUITES};
use nmos_conformance::{ConformanceRunner, MockRegistry, ScriptedOracle, Selection, SuiteReport, TestSuite};
use nmos_core::compliance::{validate_against, Policy};
use nmos_core::TestConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nmos-cli", version, about = "NMOS conformance testing")]
struct Cli {
	/// TOML configuration file; NMOS_* environment variables are used when absent
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	#[command(subcommand)]
	cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// List the available suites
	ListSuites,
	/// List the test cases of one suite
	ListTests { suite: String },
	/// Run a suite, or a single case of it
	Run(RunArgs),
	/// Serve the mock registry until interrupted
	MockRegistry {
		/// Defaults to port_base + 100
		#[arg(long)]
		port: Option<u16>,
		/// Ignore paging.* parameters like a registry without pagination
		#[arg(long)]
		no_paging: bool,
	},
	/// Configuration utilities
	Config {
		#[command(subcommand)]
		cmd: ConfigCmd,
	},
}

#[derive(Args, Debug)]
struct RunArgs {
	suite: String,
	/// Run only this case
	#[arg(long)]
	test: Option<String>,
	/// Registration API of the registry under test; a mock registry is started when absent
	#[arg(long, requires = "query_url")]
	registration_url: Option<String>,
	/// Query API of the registry under test
	#[arg(long, requires = "registration_url")]
	query_url: Option<String>,
	/// Testing Façade that relays questions to a human tester
	#[arg(long)]
	facade_url: Option<String>,
	/// Report these cases as disabled instead of running them
	#[arg(long = "ignore", value_delimiter = ',')]
	ignore: Vec<String>,
	#[arg(long, value_enum, default_value_t = Output::Console)]
	output: Output,
	/// Also write the JSON report to this file
	#[arg(long)]
	report: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Output {
	Console,
	Json,
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
	/// Print the resolved configuration
	Show {
		#[arg(long)]
		toml: bool,
	},
	/// Write a commented configuration template
	WriteTemplate {
		#[arg(long, default_value = "nmos.toml")]
		path: PathBuf,
		#[arg(long)]
		force: bool,
	},
}

const TEMPLATE: &str = r#"# nmos-cli configuration

# trace | debug | info | warn | error (RUST_LOG takes precedence)
log_level = "info"

# Expect https:// in Link headers and registry URLs
enable_https = false

# Timeout for each HTTP request to the registry
http_timeout_ms = 1000

# Time an implementation may take to react to an API call
api_processing_timeout_ms = 1000

# How long to wait for a tester's answer; 0 waits forever
controller_testing_timeout_secs = 600

# Delay between paging fixture registrations (at most 250)
paging_timestamp_delay_ms = 100

heartbeat_interval_secs = 5

# Fixes fixture ids and the interop catalogue shuffle
# random_seed = 42

# Answer listener at port_base, mock registry at port_base + 100
port_base = 5000

query_api_version = "v1.3"
"#;

fn main() {
	let cli = Cli::parse();
	let code = match real_main(cli) {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:#}");
			EXIT_ERROR
		}
	};
	std::process::exit(code);
}

fn real_main(cli: Cli) -> Result<i32> {
	let config = load_config(cli.config.as_deref())?;
	match cli.cmd {
		Commands::ListSuites => {
			let mut table = table(&["Suite", "Description"]);
			for (name, description) in SUITES {
				table.add_row(vec![*name, *description]);
			}
			println!("{table}");
			Ok(0)
		}
		Commands::ListTests { suite } => {
			let cases = list_tests(&config, &suite)?;
			let mut table = table(&["Test", "Description"]);
			for (name, description) in cases {
				table.add_row(vec![name, description]);
			}
			println!("{table}");
			Ok(0)
		}
		Commands::Config { cmd: ConfigCmd::Show { toml } } => {
			if toml {
				print!("{}", toml::to_string_pretty(&config)?);
			} else {
				println!("{}", serde_json::to_string_pretty(&config)?);
			}
			Ok(0)
		}
		Commands::Config { cmd: ConfigCmd::WriteTemplate { path, force } } => {
			if path.exists() && !force {
				eprintln!("refusing to overwrite existing file: {} (use --force)", path.display());
				return Ok(2);
			}
			std::fs::write(&path, TEMPLATE).with_context(|| format!("writing {}", path.display()))?;
			eprintln!("wrote {}", path.display());
			Ok(0)
		}
		Commands::Run(args) => {
			init_tracing(&config.log_level);
			validate_against(&config, Policy::default())?;
			runtime()?.block_on(run(config, args))
		}
		Commands::MockRegistry { port, no_paging } => {
			init_tracing(&config.log_level);
			runtime()?.block_on(serve_mock(config, port, no_paging))
		}
	}
}

fn load_config(path: Option<&Path>) -> Result<TestConfig> {
	let config = match path {
		Some(p) => TestConfig::load_from_file(p).with_context(|| format!("loading {}", p.display()))?,
		None => TestConfig::from_env()?,
	};
	Ok(config)
}

fn init_tracing(level: &str) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
	Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

fn table(header: &[&str]) -> Table {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic).set_header(header.to_vec());
	table
}

fn list_tests(config: &TestConfig, suite: &str) -> Result<Vec<(&'static str, &'static str)>> {
	let target = Target::mock_on_port(config.mock_registry_port());
	let cases = match suite {
		QueryPagingSuite::NAME => describe(&QueryPagingSuite::new(config.clone(), target)),
		NodeRegistrationSuite::NAME => describe(&NodeRegistrationSuite::new(config.clone(), target)),
		Tr08ControllerSuite::NAME => {
			let unused = Arc::new(ScriptedOracle::new(|_| serde_json::Value::Null));
			describe(&Tr08ControllerSuite::new(config.clone(), target, unused))
		}
		other => bail!("unknown suite {other:?}; see list-suites"),
	};
	Ok(cases)
}

fn describe<S: TestSuite>(suite: &S) -> Vec<(&'static str, &'static str)> {
	suite.tests().iter().map(|c| (c.name, c.description)).collect()
}

async fn run(config: TestConfig, args: RunArgs) -> Result<i32> {
	let target = match (args.registration_url, args.query_url) {
		(Some(registration_url), Some(query_url)) => Target::Remote { registration_url, query_url },
		_ => Target::mock_on_port(config.mock_registry_port()),
	};
	let selection = args.test.map_or(Selection::All, Selection::Single);
	let runner = ConformanceRunner::new(config.clone()).with_ignored(args.ignore);
	info!(suite = %args.suite, ?target, "starting");

	let report = match args.suite.as_str() {
		QueryPagingSuite::NAME => runner.run(&mut QueryPagingSuite::new(config, target), &selection).await,
		NodeRegistrationSuite::NAME => runner.run(&mut NodeRegistrationSuite::new(config, target), &selection).await,
		Tr08ControllerSuite::NAME => {
			let Some(url) = args.facade_url else { bail!("{} needs --facade-url", Tr08ControllerSuite::NAME) };
			let mut suite = Tr08ControllerSuite::with_facade(config, target, &url)?;
			runner.run(&mut suite, &selection).await
		}
		other => bail!("unknown suite {other:?}; see list-suites"),
	};
	let report = match report {
		Ok(report) => report,
		Err(e) => {
			error!(error = %e, "suite could not run");
			return Err(e.into());
		}
	};

	if let Some(path) = &args.report {
		std::fs::write(path, report.to_json_pretty()?).with_context(|| format!("writing {}", path.display()))?;
	}
	match args.output {
		Output::Json => println!("{}", report.to_json_pretty()?),
		Output::Console => print_report(&report),
	}
	Ok(report.exit_code())
}

fn print_report(report: &SuiteReport) {
	let mut results = table(&["Test", "Result", "Detail"]);
	for r in &report.results {
		results.add_row(vec![r.name.clone(), r.state.to_string(), r.detail.clone()]);
	}
	println!("{results}");
	let summary: Vec<String> = report.counts().iter().map(|(state, n)| format!("{state}: {n}")).collect();
	let worst = report.worst().map_or_else(|| "no results".to_string(), |s| s.to_string());
	println!("{} in {:.1}s, worst {worst}: {}", report.suite, report.duration, summary.join(", "));
}

async fn serve_mock(config: TestConfig, port: Option<u16>, no_paging: bool) -> Result<i32> {
	let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or_else(|| config.mock_registry_port())));
	let registry = MockRegistry::new(config.protocol(), config.query_api_version);
	registry.set_paging_supported(!no_paging);
	let server = registry.spawn(addr).await?;
	println!("registration: {}", server.registration_url());
	println!("query:        {}", server.query_url());
	tokio::signal::ctrl_c().await?;
	info!(requests = registry.history().posts.len(), "shutting down");
	Ok(0)
}
