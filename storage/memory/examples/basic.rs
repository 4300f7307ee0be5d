//! Basic in-process indexing example

use redimension_core::RangeIndex;
use redimension_storage_memory::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut index = RangeIndex::new(MemoryStore::new(), 2, 32)?;
    index.index("cities", "cities_map", "berlin", &[1337, 5252]).await?;
    index.index("cities", "cities_map", "paris", &[233, 4886]).await?;
    index.index("cities", "cities_map", "oslo", &[871, 4012]).await?;

    for hit in index.query("cities", &[(0, 1000), (4000, 5000)]).await? {
        println!("{} at {:?}", hit.id, hit.pos);
    }
    Ok(())
}
