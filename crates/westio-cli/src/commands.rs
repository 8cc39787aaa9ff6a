use crate::cli::{CreateArgs, InfoArgs};
use crate::error::Result;
use tracing::info;
use westio::store::{StoreConfig, WestFile};

pub fn create(args: CreateArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => StoreConfig::from_toml_path(path)?,
        None => StoreConfig::default(),
    };
    let store = WestFile::create(&args.path, config)?;
    info!(path = %store.path().display(), "store created");
    println!("Created iteration store at {}", store.path().display());
    Ok(())
}

pub fn info(args: InfoArgs) -> Result<()> {
    let store = WestFile::open(&args.path)?;
    let config = store.config();
    println!("Store:               {}", store.path().display());
    println!("Format version:      {}", config.file_format_version);
    println!("Iteration padding:   {}", config.iter_prec);
    println!("Writer version:      {}", config.west_version);

    let n_iterations = store.num_iterations()?;
    println!("Durable iterations:  {n_iterations}");

    for n in 1..=n_iterations {
        let row = store.summary_row(n)?;
        println!(
            "  iter {:>6}: particles={:<6} norm={:<12.8} seg=[{:.3e}, {:.3e}] bin=[{:.3e}, {:.3e}]",
            n,
            row.n_particles,
            row.norm,
            row.min_seg_prob,
            row.max_seg_prob,
            row.min_bin_prob,
            row.max_bin_prob,
        );
    }
    Ok(())
}
