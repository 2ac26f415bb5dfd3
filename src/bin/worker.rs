use clap::Parser;
use env_logger::{Env, Target};
use taskbridge::worker;

/// Worker process for taskbridge tasks (started by the supervisor)
#[derive(Parser)]
#[command(name = "taskbridge-worker")]
#[command(version)]
#[command(about = "Serves one task over stdin/stdout; started by the taskbridge supervisor")]
struct Args {
    /// Bridge adapting the task (build, release, submit)
    bridge: String,

    /// Task implementation to run behind the bridge
    task: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Stdout carries the channel; logs must go to stderr.
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .target(Target::Stderr)
        .init();

    let args = Args::parse();
    let code = match worker::run(&args.bridge, &args.task).await {
        Ok(()) => 0,
        Err(err) => {
            log::error!(target: "taskbridge::worker", "{}", err);
            1
        }
    };

    // Exit without waiting for the runtime: the stdin reader may still be
    // parked in a blocking read.
    std::process::exit(code);
}
