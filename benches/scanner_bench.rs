use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use virenwald::db;
use virenwald::scanner::classify::{classify, extract_signature, FileVerdict};
use virenwald::scanner::invoker::FileScanner;
use virenwald::scanner::{run_scan, walker, ScanContext};
use virenwald::types::ScanOptions;

fn create_test_tree(depth: usize, files_per_dir: usize, dirs_per_level: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();

    fn create_level(
        path: &Path,
        current_depth: usize,
        max_depth: usize,
        files_per_dir: usize,
        dirs_per_level: usize,
    ) {
        if current_depth >= max_depth {
            return;
        }

        for i in 0..files_per_dir {
            let file_path = path.join(format!("file_{}.txt", i));
            fs::write(&file_path, format!("Test content {}", i)).unwrap();
        }

        for i in 0..dirs_per_level {
            let dir_path = path.join(format!("dir_{}", i));
            fs::create_dir(&dir_path).unwrap();
            create_level(dir_path.as_path(), current_depth + 1, max_depth, files_per_dir, dirs_per_level);
        }
    }

    create_level(temp_dir.path(), 0, depth, files_per_dir, dirs_per_level);
    temp_dir
}

fn options(excludes: Vec<String>) -> ScanOptions {
    ScanOptions { follow_symlinks: false, include_hidden: true, excludes, max_depth: None }
}

/// Answers instantly, so the bench measures walk + bookkeeping + SQLite writes.
struct InstantScanner;

#[async_trait]
impl FileScanner for InstantScanner {
    async fn scan_file(&self, path: &Path) -> FileVerdict {
        classify(&format!("{}: OK", path.display()))
    }

    fn describe(&self) -> String {
        "instant".into()
    }
}

fn benchmark_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("walk_files");

    for (name, depth, files, dirs) in [("small", 3, 10, 3), ("large", 4, 20, 4)] {
        let temp_dir = create_test_tree(depth, files, dirs);
        let cancel = CancellationToken::new();
        group.bench_with_input(BenchmarkId::from_parameter(name), &temp_dir, |b, dir| {
            b.iter(|| black_box(walker::walk_files(dir.path(), &options(vec![]), &cancel, |_| {}).unwrap()))
        });
    }

    let temp_dir = create_test_tree(3, 10, 3);
    let cancel = CancellationToken::new();
    let excludes = vec!["**/dir_1/**".to_string(), "**/file_5.txt".to_string()];
    group.bench_function("with_excludes", |b| {
        b.iter(|| black_box(walker::walk_files(temp_dir.path(), &options(excludes.clone()), &cancel, |_| {}).unwrap()))
    });

    group.finish();
}

fn benchmark_classify(c: &mut Criterion) {
    let infected = "/home/user/Downloads/setup: part 2.exe: Win.Trojan.Agent-1234567 FOUND";
    let clean = "/home/user/Documents/report.pdf: OK";
    let error = "LibClamAV Error: cli_loaddb(): No supported database files found in /var/lib/clamav";

    let mut group = c.benchmark_group("classify");
    group.bench_function("infected", |b| b.iter(|| black_box(classify(black_box(infected)))));
    group.bench_function("clean", |b| b.iter(|| black_box(classify(black_box(clean)))));
    group.bench_function("error", |b| b.iter(|| black_box(classify(black_box(error)))));
    group.bench_function("extract_signature", |b| b.iter(|| black_box(extract_signature(black_box(infected)))));
    group.finish();
}

fn benchmark_run_scan(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let temp_dir = create_test_tree(3, 15, 3);
    let scanner: Arc<dyn FileScanner> = Arc::new(InstantScanner);

    let mut group = c.benchmark_group("run_scan");

    for batch_size in [1usize, 50, 200].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &batch_size| {
            b.iter(|| {
                rt.block_on(async {
                    let pool =
                        SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
                    db::init_db(&pool).await.unwrap();
                    let id = Uuid::new_v4();
                    sqlx::query("INSERT INTO scans (id, status, root_path, options) VALUES (?1, 'running', ?2, '{}')")
                        .bind(id.to_string())
                        .bind(temp_dir.path().to_string_lossy().to_string())
                        .execute(&pool)
                        .await
                        .unwrap();
                    let (tx, _rx) = broadcast::channel(32);
                    let ctx = ScanContext {
                        pool,
                        id,
                        root: temp_dir.path().to_path_buf(),
                        options: options(vec![]),
                        tx,
                        cancel: CancellationToken::new(),
                        batch_size,
                        flush_interval_ms: 750,
                    };
                    black_box(run_scan(ctx, scanner.clone()).await.unwrap())
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_walk, benchmark_classify, benchmark_run_scan);
criterion_main!(benches);
