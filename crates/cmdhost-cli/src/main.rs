mod bootstrap_helpers;

use bootstrap_helpers::init_tracing;
use cmdhost_cli::{CliRuntime, RuntimeConfig};

#[tokio::main]
async fn main() {
    init_tracing();
    let code = match RuntimeConfig::from_env() {
        Ok(config) => {
            CliRuntime::new(config)
                .run(cmdhost_args::env_tokens())
                .await
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(code);
}
