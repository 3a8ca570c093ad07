/*!
# geosense-store: append-only storage and bounded queries for geolocated sensor readings

geosense-store keeps every reading a sensor station reports (what was measured, where,
and when) in a single embedded DuckDB table and answers two kinds of reads over it:

### Bounded queries
- Optional strict ranges on latitude, longitude, reading time and receipt time
- Optional exact matches on key, measurement name, unit and hardware
- Reversed ranges are normalized, absent fields match everything

### Latest station positions
- One summary per station key with its most recent position and time
- Recomputed on every request with a windowed query, no cached state

Results are returned as lazy streams that pull rows from the engine cursor as the
caller consumes them.

## Usage

```rust,no_run
use geosense_store::{MeasurementStore, MeasurementsQuery, storage::duckdb::DuckDbStore};
use futures::TryStreamExt;
use std::collections::HashMap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = DuckDbStore::new_with_options(":memory:", &HashMap::new())?;
    store.init().await?;

    let query = MeasurementsQuery::default()
        .with_lats(0.0, 10.0)
        .with_measurement_name("Temperature");
    let readings: Vec<_> = store.select_where(query).await?.try_collect().await?;
    println!("{} readings", readings.len());
    Ok(())
}
```
*/

pub mod error;
pub mod measurement;
pub mod query;
pub mod stations;
pub mod storage;

pub use error::StoreError;
pub use measurement::{LatestStationMeta, Measurement, MeasurementValue, MeasurementsQuery};
pub use query::{Column, Comparison, Condition, Operand, Predicate};
pub use stations::latest_per_key;
pub use storage::{MeasurementStore, MeasurementStream, StationStream};
