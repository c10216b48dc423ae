use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = chanlake_worker::Args::parse();

	chanlake_worker::run(args).await
}
