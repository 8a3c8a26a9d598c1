use std::collections::HashSet;
use std::time::Duration;

use crate::support::{
    helpers::{addr, init_tracing, read_checkpoint_rows, scan_config},
    mock_rpc::{MockLedger, MockRpcServer, MockTx},
};
use alloy_primitives::U256;
use anyhow::Result;
use holderscan::{
    Checkpoint, CheckpointStore, ConfigError, CsvCheckpointStore, Holder, HolderScan, RunPhase,
    ScanOutcome,
};
use tokio::time::{sleep, timeout};

/// Six blocks touching eight addresses; block 4 is empty and block 1 holds a
/// contract creation.
fn sample_ledger() -> MockLedger {
    MockLedger::new(6)
        .with_block(0, vec![MockTx::transfer(addr(1), addr(2))])
        .with_block(
            1,
            vec![MockTx::transfer(addr(2), addr(3)), MockTx::creation(addr(4))],
        )
        .with_block(2, vec![MockTx::transfer(addr(5), addr(1))])
        .with_block(3, vec![MockTx::transfer(addr(6), addr(7))])
        .with_block(5, vec![MockTx::transfer(addr(1), addr(8))])
        .with_balance(addr(1), 100)
        .with_balance(addr(2), 50)
        .with_balance(addr(3), 75)
        .with_balance(addr(4), 10)
        .with_balance(addr(5), 5)
        .with_balance(addr(6), 500)
        .with_balance(addr(8), 60)
}

fn balances(holders: &[Holder]) -> Vec<(u8, u64)> {
    holders
        .iter()
        .map(|holder| (holder.address[0], holder.balance.to::<u64>()))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_range_ranks_the_largest_holders() -> Result<()> {
    init_tracing();
    let ledger = sample_ledger();
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("top.csv");

    let config = scan_config(server.url(), &output)
        .start_block(0)
        .top_k(3)
        .build()?;
    let scan = HolderScan::new(config)?;
    let state = scan.state();

    let report = timeout(Duration::from_secs(20), scan.run()).await??;
    let report = report.into_result()?;

    assert_eq!(report.outcome, ScanOutcome::RangeExhausted);
    assert_eq!(report.range.start(), 0);
    assert_eq!(report.range.end(), 6);
    assert_eq!(report.last_processed_block, Some(5));
    assert_eq!(balances(&report.holders), vec![(6, 500), (1, 100), (3, 75)]);
    assert_eq!(report.telemetry.blocks_scanned, 6);
    assert_eq!(report.telemetry.empty_participants, 1);
    assert_eq!(state.phase(), RunPhase::Finalized);

    // Balances are read at the end of the range, once per address.
    assert_eq!(ledger.balance_calls(), 8);
    assert_eq!(ledger.balance_tags(), HashSet::from([6]));

    let rows = read_checkpoint_rows(&output)?;
    assert_eq!(rows[0], vec!["5".to_string()]);
    assert_eq!(
        rows[1..].to_vec(),
        vec![
            vec![addr(6).to_string(), "500".to_string()],
            vec![addr(1).to_string(), "100".to_string()],
            vec![addr(3).to_string(), "75".to_string()],
        ]
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_address_is_queried_once_across_workers() -> Result<()> {
    init_tracing();
    let mut ledger = MockLedger::new(40);
    for block in 0..40u64 {
        // The same four addresses appear in every block.
        let first = (block % 4) as u8 + 1;
        let second = ((block + 1) % 4) as u8 + 1;
        ledger = ledger.with_block(block, vec![MockTx::transfer(addr(first), addr(second))]);
    }
    for byte in 1..=4u8 {
        ledger = ledger.with_balance(addr(byte), byte as u64);
    }
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;

    let config = scan_config(server.url(), &dir.path().join("top.csv"))
        .start_block(0)
        .end_block(40)
        .thread_count(8)
        .top_k(10)
        .build()?;
    let report = timeout(Duration::from_secs(20), HolderScan::new(config)?.run()).await??;

    assert_eq!(report.outcome, ScanOutcome::RangeExhausted);
    assert_eq!(report.holders.len(), 4);
    assert_eq!(ledger.balance_calls(), 4);
    for byte in 1..=4u8 {
        assert_eq!(ledger.balance_calls_for(addr(byte)), 1);
    }
    assert_eq!(report.telemetry.duplicate_addresses, 76);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn balance_failure_stops_at_the_failing_block() -> Result<()> {
    init_tracing();
    let ledger = sample_ledger();
    ledger.fail_balance_of(addr(3));
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("top.csv");

    let config = scan_config(server.url(), &output)
        .start_block(0)
        .end_block(4)
        .thread_count(1)
        .top_k(5)
        .build()?;
    let scan = HolderScan::new(config)?;
    let state = scan.state();
    let report = timeout(Duration::from_secs(20), scan.run()).await??;

    assert_eq!(report.outcome, ScanOutcome::Failed);
    assert_eq!(report.stopping_block, Some(1));
    assert_eq!(report.last_processed_block, Some(0));
    assert_eq!(balances(&report.holders), vec![(1, 100), (2, 50)]);
    assert!(report.checkpoint_error.is_none());
    assert_eq!(state.phase(), RunPhase::Finalized);

    // Nothing after the failing block was looked up.
    assert_eq!(ledger.balance_calls_for(addr(5)), 0);
    assert_eq!(ledger.balance_calls_for(addr(6)), 0);

    let rows = read_checkpoint_rows(&output)?;
    assert_eq!(rows[0], vec!["0".to_string()]);
    assert_eq!(rows.len(), 3);

    let err = report.into_result().unwrap_err();
    let rendered = format!("{err:#}");
    assert!(rendered.contains("stopped at block 1"), "{rendered}");
    assert!(rendered.contains("eth_getBalance"), "{rendered}");

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn later_blocks_stay_out_of_the_checkpoint_when_an_earlier_block_fails() -> Result<()> {
    init_tracing();
    let ledger = MockLedger::new(5)
        .with_block(0, vec![MockTx::creation(addr(9))])
        .with_block(1, vec![MockTx::transfer(addr(1), addr(2))])
        .with_block(2, vec![MockTx::transfer(addr(3), addr(4))])
        .with_balance(addr(1), 100)
        .with_balance(addr(2), 200)
        .with_balance(addr(3), 300)
        .with_balance(addr(4), 400);
    ledger.delay_balance_of(addr(9), Duration::from_millis(300));
    ledger.fail_balance_of(addr(9));
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("top.csv");

    let config = scan_config(server.url(), &output)
        .start_block(0)
        .end_block(3)
        .thread_count(3)
        .top_k(5)
        .build()?;
    let report = timeout(Duration::from_secs(20), HolderScan::new(config)?.run()).await??;

    assert_eq!(report.outcome, ScanOutcome::Failed);
    assert_eq!(report.stopping_block, Some(0));
    assert_eq!(report.last_processed_block, None);
    assert!(report.holders.is_empty(), "{:?}", report.holders);

    // Blocks 1 and 2 finished while block 0 was stuck, then were dropped.
    assert_eq!(ledger.balance_calls_for(addr(4)), 1);
    assert_eq!(report.maintainer.blocks_discarded, 2);
    assert_eq!(report.maintainer.candidates_ranked, 0);

    let rows = read_checkpoint_rows(&output)?;
    assert_eq!(rows, vec![vec![String::new()]]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn block_fetch_failure_keeps_the_contiguous_prefix() -> Result<()> {
    init_tracing();
    let ledger = sample_ledger();
    ledger.fail_block(2);
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;

    let config = scan_config(server.url(), &dir.path().join("top.csv"))
        .start_block(0)
        .thread_count(1)
        .build()?;
    let report = timeout(Duration::from_secs(20), HolderScan::new(config)?.run()).await??;

    assert_eq!(report.outcome, ScanOutcome::Failed);
    assert_eq!(report.stopping_block, Some(2));
    assert_eq!(report.last_processed_block, Some(1));
    assert_eq!(report.holders.len(), 4);
    assert_eq!(ledger.balance_calls_for(addr(6)), 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resumes_from_a_csv_checkpoint() -> Result<()> {
    init_tracing();
    let ledger = sample_ledger();
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;
    let seed_path = dir.path().join("seed.csv");
    let output = dir.path().join("resumed.csv");

    CsvCheckpointStore::new(&seed_path).save(&Checkpoint::new(
        Some(2),
        vec![
            Holder::new(addr(1), U256::from(100u64)),
            Holder::new(addr(3), U256::from(75u64)),
        ],
    ))?;

    let config = scan_config(server.url(), &output)
        .seed_checkpoint(&seed_path)
        .end_block(6)
        .top_k(3)
        .build()?;
    let report = timeout(Duration::from_secs(20), HolderScan::new(config)?.run()).await??;

    assert_eq!(report.outcome, ScanOutcome::RangeExhausted);
    assert_eq!(report.range.start(), 3);
    assert_eq!(report.last_processed_block, Some(5));
    assert_eq!(balances(&report.holders), vec![(6, 500), (1, 100), (3, 75)]);

    // Blocks 3..6 touch 6, 7, 1 and 8; 1 is already in the seed.
    assert_eq!(ledger.balance_calls(), 3);
    assert_eq!(ledger.balance_calls_for(addr(1)), 0);

    let reloaded = CsvCheckpointStore::new(&output).load(&output)?;
    assert_eq!(reloaded.last_processed_block, Some(5));
    assert_eq!(reloaded.holders, report.holders);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn range_past_the_tip_is_rejected_without_output() -> Result<()> {
    init_tracing();
    let ledger = sample_ledger();
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("top.csv");

    let config = scan_config(server.url(), &output)
        .start_block(10)
        .build()?;
    let err = HolderScan::new(config)?.run().await.unwrap_err();

    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::EmptyRange { start: 10, end: 6 })
    );
    assert!(!output.exists());
    assert_eq!(ledger.balance_calls(), 0);

    let inverted = scan_config(server.url(), &output)
        .start_block(5)
        .end_block(5)
        .build();
    assert!(inverted.is_err());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_http_errors_are_retried_when_allowed() -> Result<()> {
    init_tracing();
    let ledger = sample_ledger();
    ledger.reject_next_balance_requests(2);
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;

    let config = scan_config(server.url(), &dir.path().join("top.csv"))
        .start_block(0)
        .top_k(3)
        .rpc_max_attempts(3)
        .build()?;
    let report = timeout(Duration::from_secs(20), HolderScan::new(config)?.run()).await??;

    assert_eq!(report.outcome, ScanOutcome::RangeExhausted);
    assert_eq!(balances(&report.holders), vec![(6, 500), (1, 100), (3, 75)]);
    let rpc = report.rpc.expect("json-rpc client reports metrics");
    assert_eq!(rpc.total_retries, 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_attempt_turns_a_transient_error_into_a_failure() -> Result<()> {
    init_tracing();
    let ledger = sample_ledger();
    ledger.reject_next_balance_requests(1);
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("top.csv");

    let config = scan_config(server.url(), &output)
        .start_block(0)
        .thread_count(1)
        .build()?;
    let report = timeout(Duration::from_secs(20), HolderScan::new(config)?.run()).await??;

    assert_eq!(report.outcome, ScanOutcome::Failed);
    assert_eq!(report.stopping_block, Some(0));
    assert_eq!(report.last_processed_block, None);
    assert!(report.holders.is_empty());

    let rows = read_checkpoint_rows(&output)?;
    assert_eq!(rows, vec![vec![String::new()]]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_drains_and_saves_a_consistent_checkpoint() -> Result<()> {
    init_tracing();
    let blocks = 20_000;
    let mut ledger = MockLedger::new(blocks);
    for block in (0..blocks).step_by(50) {
        let byte = (block / 50 % 200) as u8 + 1;
        ledger = ledger
            .with_block(block, vec![MockTx::creation(addr(byte))])
            .with_balance(addr(byte), byte as u64);
    }
    let server = MockRpcServer::start(ledger.clone()).await?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("top.csv");

    let config = scan_config(server.url(), &output)
        .start_block(0)
        .top_k(1_000)
        .build()?;
    let scan = HolderScan::new(config)?;
    let token = scan.cancellation_token();
    let telemetry = scan.telemetry();
    let handle = tokio::spawn(scan.run());

    timeout(Duration::from_secs(10), async {
        while telemetry.blocks_scanned() < 10 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    token.cancel();

    let report = timeout(Duration::from_secs(20), handle).await???;
    assert_eq!(report.outcome, ScanOutcome::Interrupted);
    assert!(report.error.is_none());
    let watermark = report
        .last_processed_block
        .expect("some blocks completed before the cancel");
    assert!(watermark < blocks - 1);
    assert!(report.enqueued_blocks < blocks);

    let reloaded = CsvCheckpointStore::new(&output).load(&output)?;
    assert_eq!(reloaded.last_processed_block, Some(watermark));
    assert_eq!(reloaded.holders, report.holders);
    assert!(report.into_result().is_ok());

    server.shutdown().await;
    Ok(())
}
