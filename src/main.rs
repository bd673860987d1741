use script_bridge::cli::CliOverrides;
use script_bridge::run_with_overrides;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    match run_with_overrides(&cli) {
        Ok(summary) => {
            for message in &summary.messages {
                println!("[emu] {message}");
            }
            println!("[script] {} frame(s), final state {:?}", summary.frames_run, summary.state);
            if let Some(error) = summary.error {
                eprintln!("[script] {error}");
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Application error: {err:?}");
            std::process::exit(1);
        }
    }
}
