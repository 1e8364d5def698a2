//! Texture store walkthrough -- create, persist, reload and hydrate a texture.
//!
//! Run with:
//!   cargo run --example texture_store -p tessera-repository
//!
//! Set `RUST_LOG=tessera_repository=debug,tessera_store=debug` to follow the
//! cache and store traffic.

use std::sync::Arc;

use anyhow::Context;
use tessera_repository::prelude::*;
use tessera_repository::texture::TEXTURE_RTTI;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let dir = tempfile::tempdir().context("creating store directory")?;
    let media = dir.path().join("media");
    std::fs::create_dir_all(&media)?;
    std::fs::write(media.join("earth.png"), vec![0x7fu8; 4 * 4 * 4])?;

    let mut config = StoreConfig {
        root: dir.path().to_path_buf(),
        ..StoreConfig::default()
    };
    config.mounts.insert("media".to_owned(), media);
    config.validate()?;

    let fs: Arc<dyn FileSystem> = Arc::new(config.file_system());
    let store = config
        .mapper(Family::Textures.name(), Arc::clone(&fs))
        .context("textures family is not configured")?;

    let repo: Repository<Texture> = Repository::new(Arc::new(store));
    register_texture_factory(repo.factory());
    let events = repo.subscribe();

    // -- create and persist --

    let earth = EntityId::new("earth", TEXTURE_RTTI);
    let doc = TextureAssembler::assemble(
        &Texture::ghost(earth.clone())
            .with_dimension(4, 4)
            .with_source("earth.png@media"),
    );
    let created = repo
        .request_constitution(&earth, &doc, PersistenceLevel::Store)
        .context("earth texture was not created")?;
    println!("created {:?}", created);
    drop(created);

    // -- restart --

    repo.disconnect();
    repo.connect();
    println!(
        "after restart: has={} cached={}",
        repo.has(&earth),
        repo.is_cached(&earth)
    );

    // -- reload and hydrate --

    let texture = repo.query(&earth).context("earth texture did not reload")?;
    let queue: HydrationQueue<Texture> = HydrationQueue::new(Arc::new(TextureHydrator::new(fs)));
    let hydration = queue.subscribe();
    queue.enqueue(Arc::clone(&texture), texture.assemble())?;
    queue.pump();

    println!(
        "hydrated {:?}: {} bytes",
        texture.status().current(),
        texture.with_payload(|p| p.len()).unwrap_or(0)
    );

    for event in events.try_iter() {
        println!("repository: {event:?}");
    }
    for event in hydration.try_iter() {
        println!("hydration: {event:?}");
    }
    Ok(())
}
