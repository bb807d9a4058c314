use isegm_eval::model::SamLoader;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, config) = isegm_eval::parse_args()?;
    let mut loader = SamLoader::new(args.device, &config)?;
    isegm_eval::run(&args, &config, &mut loader)?;
    Ok(())
}
