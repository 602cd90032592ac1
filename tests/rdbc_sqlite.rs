use batch_pipeline::{
    core::{
        item::DefaultProcessor,
        job::{Job, JobBuilder, JobParameters},
        step::StepBuilder,
        BatchStatus,
    },
    item::{
        csv::csv_reader::CsvItemReaderBuilder,
        rdbc::{DatabaseItemBinder, SqliteItemWriterBuilder},
    },
};
use serde::Deserialize;
use sqlx::{
    migrate::MigrateDatabase, query_builder::Separated, sqlite::SqlitePoolOptions, Sqlite,
};
use tempfile::NamedTempFile;

#[derive(Deserialize, Clone)]
struct City {
    country: String,
    name: String,
    population: i64,
}

struct CityBinder;

impl DatabaseItemBinder<City, Sqlite> for CityBinder {
    fn bind(&self, item: &City, mut query_builder: Separated<Sqlite, &str>) {
        query_builder.push_bind(item.country.clone());
        query_builder.push_bind(item.name.clone());
        query_builder.push_bind(item.population);
    }
}

const CITIES: &str = "country,name,population
France,Paris,2102650
Italy,Rome,2748109
Spain,Madrid,3332035
Spain,Madrid,3332035
Germany,Berlin,3755251";

#[tokio::test(flavor = "multi_thread")]
async fn csv_rows_should_land_in_a_file_database() -> Result<(), sqlx::Error> {
    let database_file = NamedTempFile::new()?;
    let connection_uri = format!("sqlite://{}", database_file.path().display());
    if !Sqlite::database_exists(&connection_uri).await.unwrap_or(false) {
        Sqlite::create_database(&connection_uri).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&connection_uri)
        .await?;
    sqlx::query(
        "CREATE TABLE cities (country TEXT NOT NULL, name TEXT PRIMARY KEY, population INTEGER)",
    )
    .execute(&pool)
    .await?;

    let reader = CsvItemReaderBuilder::new()
        .has_headers(true)
        .from_reader(CITIES.as_bytes());
    let binder = CityBinder;
    let writer = SqliteItemWriterBuilder::new()
        .pool(&pool)
        .table("cities")
        .add_column("country")
        .add_column("name")
        .add_column("population")
        .item_binder(&binder)
        .build()
        .unwrap();

    let step = StepBuilder::<City, City>::new()
        .name("cities")
        .reader(&reader)
        .processor(&DefaultProcessor)
        .writer(&writer)
        .chunk(2)
        .build()
        .unwrap();

    let execution = JobBuilder::new().start(&step).build().run(&JobParameters::new());

    // the second chunk repeats Madrid and is rolled back as a whole
    assert_eq!(execution.status, BatchStatus::Failed);
    let step = execution.step_execution("cities").unwrap();
    assert_eq!(step.read_count, 4);
    assert_eq!(step.write_count, 2);
    assert_eq!(step.failed_count, 2);
    assert!(step.failure.as_deref().unwrap().contains("SQLite write failed"));

    let names: Vec<(String,)> = sqlx::query_as("SELECT name FROM cities ORDER BY rowid")
        .fetch_all(&pool)
        .await?;
    assert_eq!(names, vec![("Paris".to_string(),), ("Rome".to_string(),)]);

    pool.close().await;
    Ok(())
}
