use std::sync::Arc;

use bramble::buffer::{BufferPoolManager, ReplacerPolicy};
use bramble::catalog::Catalog;
use bramble::execution::{
    build_executor, AggregateExpr, AggregationPlan, AggregationType, CompareOp, Executor,
    ExecutorContext, Expression, InsertPlan, InsertSource, Plan, SeqScanPlan,
};
use bramble::storage::disk::DiskManager;
use bramble::tuple::{DataType, Schema, Value};

fn main() {
    env_logger::init();

    println!("Bramble - an educational disk-oriented database engine");
    println!("======================================================\n");

    let db_path = "demo.db";
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    let bpm = Arc::new(BufferPoolManager::new(
        64,
        ReplacerPolicy::Lru,
        disk_manager,
    ));
    let catalog = Arc::new(Catalog::new(Arc::clone(&bpm)));
    println!("Opened {} with a 64-frame LRU buffer pool\n", db_path);

    // Define a table and a secondary index on its key column.
    let schema = Schema::builder()
        .column("id", DataType::Integer)
        .column("name", DataType::VarChar(32))
        .column("points", DataType::Integer)
        .build_arc();
    catalog
        .create_table("players", schema)
        .expect("failed to create table");
    catalog
        .create_index("players_id_idx", "players", vec![0])
        .expect("failed to create index");
    println!("Created table 'players' and index 'players_id_idx'");

    // Load a few rows through the Insert executor.
    let rows = vec![
        vec![Value::Integer(1), Value::from("ada"), Value::Integer(90)],
        vec![Value::Integer(2), Value::from("grace"), Value::Integer(70)],
        vec![Value::Integer(3), Value::from("edsger"), Value::Integer(85)],
        vec![Value::Integer(4), Value::from("barbara"), Value::Integer(70)],
    ];
    let ctx = ExecutorContext::new(Arc::clone(&catalog), Arc::clone(&bpm));
    let insert = Plan::Insert(InsertPlan {
        table: "players".to_string(),
        source: InsertSource::Values(rows),
    });
    let mut executor = build_executor(insert, ctx.clone());
    executor.init().expect("insert init failed");
    executor.next().expect("insert failed");
    println!("Inserted 4 rows\n");

    // Filtered scan: points > 70.
    let scan = Plan::SeqScan(SeqScanPlan {
        table: "players".to_string(),
        predicate: Some(Expression::compare(
            CompareOp::Gt,
            Expression::column(2),
            Expression::constant(70),
        )),
        output_columns: None,
    });
    let mut executor = build_executor(scan, ctx.clone());
    executor.init().expect("scan init failed");
    println!("Players with more than 70 points:");
    while let Some((tuple, _rid)) = executor.next().expect("scan failed") {
        println!(
            "  id={} name={} points={}",
            tuple.value(0).unwrap(),
            tuple.value(1).unwrap(),
            tuple.value(2).unwrap()
        );
    }

    // Point lookup through the index.
    let index = catalog.index("players_id_idx").expect("index missing");
    let key = 3i32.to_le_bytes();
    match index.index.get_value(&key).expect("lookup failed") {
        Some(rid) => println!("\nIndex probe for id=3 found tuple at {}", rid),
        None => println!("\nIndex probe for id=3 found nothing"),
    }

    // Grand aggregate: count and max points.
    let agg = Plan::Aggregation(AggregationPlan {
        child: Box::new(Plan::SeqScan(SeqScanPlan {
            table: "players".to_string(),
            predicate: None,
            output_columns: None,
        })),
        group_by: vec![],
        aggregates: vec![
            AggregateExpr {
                op: AggregationType::Count,
                arg: Expression::column(0),
                alias: "n".to_string(),
            },
            AggregateExpr {
                op: AggregationType::Max,
                arg: Expression::column(2),
                alias: "best".to_string(),
            },
        ],
        having: None,
    });
    let mut executor = build_executor(agg, ctx);
    executor.init().expect("aggregation init failed");
    if let Some((tuple, _)) = executor.next().expect("aggregation failed") {
        println!(
            "\n{} players, best score {}",
            tuple.value(0).unwrap(),
            tuple.value(1).unwrap()
        );
    }

    bpm.flush_all_pages().expect("flush failed");
    std::fs::remove_file(db_path).ok();
    println!("\nDone.");
}
