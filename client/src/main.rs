mod command_runner;
mod config;
mod namenode;

use command_runner::{Command, CommandRunner};
use config::load_config;
use namenode::service::NamenodeService;
use tokio::io::{AsyncBufReadExt, BufReader, stdin};
use utilities::{
    logger::{error, info, init_logger},
    result::Result,
};

/// `client <command> [args..]` runs one command, without arguments commands
/// are read from stdin line by line.
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _gaurd = init_logger(
        "Client",
        &config.client_id,
        &config.log_level,
        &config.log_base,
        config.apm_endpoint.as_deref(),
    )?;
    let namenode = NamenodeService::new(config.namenode_addrs.clone(), config.io_timeout());
    let command_runner = CommandRunner::new(namenode);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        let outcome = match Command::from_words(args) {
            Ok(command) => command_runner.run(command).await,
            Err(e) => Err(e),
        };
        return match outcome {
            Ok(message) => {
                println!("{message}");
                Ok(())
            }
            Err(e) => {
                eprintln!("Error : {e}");
                Err(e)
            }
        };
    }

    info!(namenode_addrs = %config.namenode_addrs, "starting the Client");
    let mut lines = BufReader::new(stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match command_runner.handle_input(&line).await {
                Ok(message) => println!("{message}"),
                Err(e) => println!("Error : {e}"),
            },
            Ok(None) => return Ok(()),
            Err(e) => {
                error!("error while reading the command {e:?}");
                return Err(e.into());
            }
        }
    }
}
