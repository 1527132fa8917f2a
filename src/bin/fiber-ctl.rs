use clap::{Parser, Subcommand};

use fiber_node::{backend::InferenceTask, client::FiberClient};

/// fiber-ctl: requester-side CLI for a running fiber-node
///
/// Each invocation starts without a session, so `challenge` performs the
/// inline re-handshake on its first request.
#[derive(Parser, Debug)]
#[command(name = "fiber-ctl", version, about = "Requester CLI for fiber-node")]
struct Cli {
    /// Base URL of the responder
    #[arg(long, env = "FIBER_NODE_URL", default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Peer identifier sent with every request
    #[arg(long, env = "FIBER_PEER_ID", default_value = "fiber-ctl")]
    peer: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the responder public key and fingerprint
    PublicKey,
    /// Run the two-step handshake and report the session TTL
    Handshake,
    /// Send one encrypted task and print the decrypted result
    Challenge {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_tokens: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = FiberClient::new(&cli.url, &cli.peer);

    let outcome = match cli.command {
        Commands::PublicKey => client.public_key().await.map(|pk| {
            println!("public_key:  {}", pk.public_key);
            println!("algorithm:   {}", pk.algorithm);
            println!("fingerprint: {}", pk.fingerprint);
        }),
        Commands::Handshake => client.handshake().await.map(|resp| {
            println!(
                "✅ {} (ttl {}s)",
                resp.message,
                resp.ttl_secs.unwrap_or_default()
            );
        }),
        Commands::Challenge {
            prompt,
            model,
            max_tokens,
        } => {
            let mut task = InferenceTask::new(prompt);
            task.model = model;
            task.max_tokens = max_tokens;
            client.challenge(&task).await.map(|out| {
                println!("{}", out.response_text);
                eprintln!("({} ms)", out.response_time_ms);
            })
        }
    };

    if let Err(e) = outcome {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}
