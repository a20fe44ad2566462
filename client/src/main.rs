use std::error::Error;

use client::dfs_client::DfsClient;
use utilities::logger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut args = std::env::args().skip(1);
    let metaserver_addr = args.next().expect("Please provide the metaserver address.");
    let command = args.next().unwrap_or_default();
    let _guard = logger::init_logger("Client", "client_0", "info", "logs");

    let mut client = DfsClient::connect(&metaserver_addr).await?;
    match command.as_str() {
        "upload" => {
            let path = args
                .next()
                .ok_or("usage: client <metaserver> upload <path>")?;
            client.upload_file(&path).await?;
            println!("Uploaded {path}");
        }
        "download" => {
            let name = args
                .next()
                .ok_or("usage: client <metaserver> download <name> [output]")?;
            let output = args.next().unwrap_or_else(|| name.clone());
            client.download_file(&name, &output).await?;
            println!("Downloaded {name} to {output}");
        }
        _ => {
            eprintln!("usage: client <metaserver> <upload|download> <file>");
        }
    }
    Ok(())
}
