use lockpick::cli::build_cli;

#[tokio::main]
async fn main() {
    let matches = match build_cli().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let code = i32::from(err.use_stderr());
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Err(err) = lockpick::cli::handlers::dispatch(&matches).await {
        eprintln!("Error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(err) = err.downcast_ref::<lockpick::Error>() {
        err.exit_code()
    } else if let Some(err) = err.downcast_ref::<lockpick_core::Error>() {
        err.exit_code()
    } else {
        1
    }
}
