#[cfg(test)]
mod tests {
    use crate::config::Settings;
    use crate::error::Error;
    use crate::ingest::{SensorPayload, SensorSeries, WireTimestamp};
    use crate::params::BoundedQueryParams;
    use crate::sensor_hub::SensorHub;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures::stream::{self, StreamExt, TryStreamExt};
    use geosense_store::storage::duckdb::DuckDbStore;
    use geosense_store::{
        Measurement, MeasurementStore, MeasurementStream, MeasurementValue, MeasurementsQuery,
        StoreError,
    };
    use mockall::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    mock! {
        pub Store {}
        #[async_trait]
        impl MeasurementStore for Store {
            async fn init(&self) -> Result<(), StoreError>;
            async fn insert(&self, measurement: Measurement) -> Result<(), StoreError>;
            async fn insert_batch(&self, measurements: Vec<Measurement>) -> Result<(), StoreError>;
            async fn select_all(&self) -> Result<MeasurementStream, StoreError>;
            async fn select_where(&self, query: MeasurementsQuery) -> Result<MeasurementStream, StoreError>;
            async fn clear(&self) -> Result<(), StoreError>;
        }
    }

    fn reading(key: &str, ts: Option<i64>, lat: f64, lon: f64) -> Measurement {
        Measurement {
            key: key.to_string(),
            measurement_name: "Temperature".to_string(),
            unit: "C".to_string(),
            value: MeasurementValue::Float(20.5),
            timestamp: ts.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            receipt_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            latitude: Some(lat),
            longitude: Some(lon),
            hardware: None,
        }
    }

    fn hub_with(store: MockStore) -> SensorHub {
        SensorHub::new(Arc::new(store))
    }

    async fn duckdb_hub() -> SensorHub {
        let store = DuckDbStore::new_in_memory().unwrap();
        store.init().await.unwrap();
        SensorHub::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_single_reading_goes_to_insert() {
        let mut store = MockStore::new();
        store
            .expect_insert()
            .times(1)
            .withf(|m| m.key == "Demo Buoy Station" && m.value == MeasurementValue::Integer(21))
            .returning(|_| Ok(()));
        store.expect_insert_batch().never();

        let body = json!({
            "key": "Demo Buoy Station",
            "measurement_name": "Temperature",
            "unit": "C",
            "value": 21,
            "timestamp": 1_700_000_000
        });
        let stored = assert_ok!(hub_with(store).ingest_json(body.to_string().as_bytes()).await);
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_series_is_one_batch_with_one_receipt_time() {
        let mut store = MockStore::new();
        store.expect_insert().never();
        store
            .expect_insert_batch()
            .times(1)
            .withf(|batch| {
                batch.len() == 3 && batch.iter().all(|m| m.receipt_time == batch[0].receipt_time)
            })
            .returning(|_| Ok(()));

        let series = SensorSeries {
            key: "A".to_string(),
            measurement_name: "Humidity".to_string(),
            unit: "Percentage".to_string(),
            lat: Some(1.0),
            lon: Some(2.0),
            hardware: None,
            values: vec![
                MeasurementValue::Integer(40),
                MeasurementValue::Integer(41),
                MeasurementValue::Float(42.5),
            ],
            timestamps: Some(vec![Some(WireTimestamp::Epoch(1.0)), None, Some(WireTimestamp::Epoch(3.0))]),
        };
        let stored = assert_ok!(hub_with(store).ingest_series(series).await);
        assert_eq!(stored, 3);
    }

    #[tokio::test]
    async fn test_receipt_time_is_server_assigned() {
        let mut store = MockStore::new();
        let before = Utc::now() - chrono::Duration::seconds(1);
        store
            .expect_insert()
            .times(1)
            .withf(move |m| m.receipt_time >= before && m.receipt_time <= Utc::now())
            .returning(|_| Ok(()));

        let body = br#"{"key": "A", "measurement_name": "T", "unit": "C", "value": 1,
                        "receipt_time": "1999-01-01T00:00:00Z"}"#;
        assert_ok!(hub_with(store).ingest_json(body).await);
    }

    #[tokio::test]
    async fn test_validation_failure_never_reaches_the_store() {
        let mut store = MockStore::new();
        store.expect_insert().never();
        store.expect_insert_batch().never();
        let hub = hub_with(store);

        let missing_unit = br#"{"key": "A", "measurement_name": "T", "value": 1}"#;
        let err = assert_err!(hub.ingest_json(missing_unit).await);
        assert!(matches!(err, Error::Validation(_)));

        let uneven = br#"{"key": "A", "measurement_name": "T", "unit": "C",
                          "values": [1, 2], "timestamps": [1]}"#;
        let err = assert_err!(hub.ingest_json(uneven).await);
        assert!(matches!(err, Error::Validation(ref e) if e.field == "timestamps"));

        let empty_key = SensorPayload {
            key: String::new(),
            measurement_name: "T".to_string(),
            unit: "C".to_string(),
            value: MeasurementValue::Integer(1),
            timestamp: None,
            lat: None,
            lon: None,
            hardware: None,
            receipt_time: None,
        };
        assert_err!(hub.ingest_reading(empty_key).await);
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let mut store = MockStore::new();
        store
            .expect_insert_batch()
            .times(1)
            .returning(|_| Err(StoreError::StorageUnavailable("disk detached".to_string())));

        let body = br#"{"items": [
            {"key": "A", "measurement_name": "T", "unit": "C", "value": 1},
            {"key": "B", "measurement_name": "T", "unit": "C", "value": 2}
        ]}"#;
        let err = assert_err!(hub_with(store).ingest_json(body).await);
        assert!(matches!(err, Error::Storage(_)));
        assert!(err.to_string().contains("disk detached"));
    }

    #[tokio::test]
    async fn test_default_station_reduction_over_select_all() {
        let mut store = MockStore::new();
        store.expect_select_all().times(1).returning(|| {
            let rows = vec![
                reading("A", Some(10), 1.0, 1.0),
                reading("B", Some(5), 2.0, 2.0),
                reading("A", Some(30), 3.0, 3.0),
                reading("A", Some(20), 4.0, 4.0),
                reading("B", Some(5), 5.0, 5.0),
            ];
            Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
        });

        let stations: Vec<_> = assert_ok!(hub_with(store).stations().await)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].station_key, "A");
        assert_eq!(stations[0].latitude, Some(3.0));
        assert_eq!(stations[0].latest_time, Some(Utc.timestamp_opt(30, 0).unwrap()));
        assert_eq!(stations[1].station_key, "B");
        assert_eq!(stations[1].latitude, Some(5.0));
    }

    #[tokio::test]
    async fn test_query_rejects_half_open_range() {
        let mut store = MockStore::new();
        store.expect_select_where().never();

        let params = BoundedQueryParams {
            min_lat: Some(0.0),
            ..Default::default()
        };
        let err = assert_err!(hub_with(store).query(params).await.map(|_| ()));
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_from_settings_rejects_unknown_engine() {
        let mut settings = Settings::default();
        settings.engine.engine = "sqlite".to_string();
        let err = assert_err!(SensorHub::from_settings(&settings).await.map(|_| ()));
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_end_to_end_with_duckdb() {
        let hub = duckdb_hub().await;

        for (lat, ts) in [(-5.0, 100), (0.0, 200), (5.0, 300), (10.0, 400)] {
            let body = json!({
                "key": "Demo Buoy Station",
                "measurement_name": "Temperature",
                "unit": "C",
                "value": 20,
                "timestamp": ts,
                "lat": lat,
                "lon": 0.5
            });
            assert_ok!(hub.ingest_json(body.to_string().as_bytes()).await);
        }

        let params = BoundedQueryParams {
            min_lat: Some(10.0),
            max_lat: Some(0.0),
            ..Default::default()
        };
        let found: Vec<_> = hub.query(params).await.unwrap().try_collect().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].latitude, Some(5.0));

        let stations: Vec<_> = hub.stations().await.unwrap().try_collect().await.unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].latitude, Some(10.0));
        assert_eq!(stations[0].latest_time, Some(Utc.timestamp_opt(400, 0).unwrap()));

        assert_ok!(hub.reset().await);
        let remaining: Vec<_> = hub.all_measurements().await.unwrap().try_collect().await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_series_round_trip_with_duckdb() {
        let hub = duckdb_hub().await;
        let body = br#"{"key": "A", "measurement_name": "Humidity", "unit": "Percentage",
                        "lat": 1.5, "lon": 2.5, "values": [40, 41.5],
                        "timestamps": ["2023-11-14T22:13:20Z", null]}"#;
        assert_eq!(assert_ok!(hub.ingest_json(body).await), 2);

        let all: Vec<_> = hub
            .measurements(MeasurementsQuery::default().with_key("A"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].value, MeasurementValue::Integer(40));
        assert_eq!(all[1].value, MeasurementValue::Float(41.5));
        assert_eq!(all[0].receipt_time, all[1].receipt_time);
        assert_eq!(all[0].timestamp, Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        assert_eq!(all[1].timestamp, None);
    }

    #[tokio::test]
    async fn test_failed_item_batch_stores_nothing() {
        let hub = duckdb_hub().await;
        let body = br#"{"items": [
            {"key": "A", "measurement_name": "T", "unit": "C", "value": 1},
            {"key": "B", "measurement_name": "T", "unit": "C", "value": 2, "timestamp": "never"}
        ]}"#;
        assert_err!(hub.ingest_json(body).await);

        let all: Vec<_> = hub.all_measurements().await.unwrap().try_collect().await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_payload_array_is_one_batch() {
        let mut store = MockStore::new();
        store.expect_insert().never();
        store
            .expect_insert_batch()
            .times(1)
            .withf(|batch| {
                batch.len() == 3
                    && batch.iter().all(|m| m.receipt_time == batch[0].receipt_time)
                    && batch[0].key == "A"
                    && batch[2].key == "B"
            })
            .returning(|_| Ok(()));

        let payloads = vec![
            json!({"key": "A", "measurement_name": "T", "unit": "C", "value": 1}),
            json!({"key": "B", "measurement_name": "T", "unit": "C", "values": [2, 3]}),
        ];
        assert_eq!(assert_ok!(hub_with(store).ingest_many(payloads).await), 3);
    }

    #[tokio::test]
    async fn test_invalid_array_element_stores_nothing() {
        let hub = duckdb_hub().await;
        let payloads = vec![
            json!({"key": "A", "measurement_name": "T", "unit": "C", "value": 1}),
            json!({"key": "B", "measurement_name": "T", "unit": "C"}),
        ];
        let err = assert_err!(hub.ingest_many(payloads).await);
        assert!(matches!(err, Error::Validation(ref e) if e.field.starts_with("[1].")));

        let all: Vec<_> = hub.all_measurements().await.unwrap().try_collect().await.unwrap();
        assert!(all.is_empty());
    }
}
