use clap::Parser;
use redic::{Client, Config, Value};

#[derive(Parser, Debug)]
#[command(name = "redic-cli", about = "Send a single command to a Redis server")]
struct Args {
    /// The host to connect to
    #[arg(long, default_value = "127.0.0.1", env = "REDIS_HOST")]
    host: String,
    /// The port to connect to
    #[arg(short, long, default_value_t = 6379, env = "REDIS_PORT")]
    port: u16,
    /// AUTH with this password before sending the command
    #[arg(long, env = "REDIS_PASSWORD")]
    password: Option<String>,
    /// The command and its arguments, e.g. `GET mykey`
    #[arg(required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> redic::Result<()> {
    let _ = tracing_subscriber::fmt().try_init();

    let args = Args::parse();

    let mut config = Config::new(args.host);
    config.port = args.port;
    config.password = args.password;

    let client = Client::connect(config);
    let command = Value::Array(
        args.command
            .iter()
            .map(|word| Value::from(word.as_str()))
            .collect(),
    );

    let response = client.submit(command).await?;
    println!("{}", response);

    client.shutdown().await;
    Ok(())
}
