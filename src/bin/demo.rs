//! vslog demo
//!
//! Publishes an in-process segment, runs a synthetic writer on it and
//! tails the log like a log viewer would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam::channel;
use tracing_subscriber::{fmt, EnvFilter};
use vslog::record::tags::tag_index;
use vslog::record::FormatVersion;
use vslog::transport::{MemorySegment, SegmentDirectory};
use vslog::{Config, Connection, CursorOptions, Grouping, Record, Side, StreamExit};

const SEGMENT: &str = "vslog-demo";

/// vslog demo
#[derive(Parser, Debug)]
#[command(name = "vslog-demo")]
#[command(about = "Tail a synthetic shared-memory log")]
#[command(version)]
struct Args {
    /// Query selecting transaction groups
    #[arg(short, long, default_value = "")]
    query: String,

    /// Grouping mode: raw, vxid, request or session
    #[arg(short, long, default_value = "vxid")]
    grouping: Grouping,

    /// Stop once the existing records are read
    #[arg(short, long)]
    batch: bool,

    /// Survive writer restarts
    #[arg(short, long)]
    reattach: bool,

    /// Number of client requests the writer produces
    #[arg(short = 'n', long, default_value = "5")]
    requests: u64,

    /// Write records in the legacy header format
    #[arg(long)]
    legacy: bool,

    /// Only show these tags (repeatable, `Prefix*` allowed)
    #[arg(short = 'i', long = "include")]
    include: Vec<String>,

    /// Hide these tags (repeatable, `Prefix*` allowed)
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Print a counter snapshot at the end
    #[arg(short, long)]
    stats: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vslog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("vslog demo v{}", vslog::VERSION);

    let segment = MemorySegment::new();
    SegmentDirectory::global().publish(SEGMENT, segment.clone());

    let version = if args.legacy {
        FormatVersion::Legacy
    } else {
        FormatVersion::Current
    };

    // In batch mode the log is complete before reading starts
    if args.batch {
        if let Err(e) = write_traffic(&segment, version, args.requests) {
            tracing::error!("Writer failed: {}", e);
            std::process::exit(1);
        }
    }

    let mut builder = Config::builder()
        .segment(SEGMENT)
        .query(&args.query)
        .grouping(args.grouping)
        .reattach(args.reattach)
        .cursor_options(if args.batch {
            CursorOptions::BATCH
        } else {
            CursorOptions::empty()
        });
    for tag in &args.include {
        builder = builder.include_tag(tag);
    }
    for tag in &args.exclude {
        builder = builder.exclude_tag(tag);
    }

    let connection = match Connection::open(builder.build()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("Failed to open segment: {}", e);
            std::process::exit(1);
        }
    };

    // Live mode: write concurrently and stop once the writer is done
    let writer = (!args.batch).then(|| {
        let (done_tx, done_rx) = channel::bounded::<()>(1);
        let writer_segment = segment.clone();
        let requests = args.requests;
        let writer = thread::spawn(move || {
            if let Err(e) = write_traffic(&writer_segment, version, requests) {
                tracing::error!("Writer failed: {}", e);
            }
            let _ = done_tx.send(());
        });

        let stopper = Arc::clone(&connection);
        thread::spawn(move || {
            let _ = done_rx.recv();
            thread::sleep(Duration::from_millis(100));
            stopper.stop();
        });
        writer
    });

    let printed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&printed);
    let result = connection.log(move |record: &Record| {
        println!("{}", record);
        counter.fetch_add(1, Ordering::Relaxed);
        0
    });

    if let Some(writer) = writer {
        let _ = writer.join();
    }

    match result {
        Ok(StreamExit::Aborted(rc)) => tracing::info!("Handler aborted with {}", rc),
        Ok(exit) => tracing::info!("Stream ended: {:?}", exit),
        Err(e) => {
            tracing::error!("Stream failed: {}", e);
            std::process::exit(1);
        }
    }
    tracing::info!("{} records shown", printed.load(Ordering::Relaxed));

    if args.stats {
        match connection.stats() {
            Ok(snapshot) => {
                for (name, value) in &snapshot {
                    println!("{:<32} {:>12}", name, value);
                }
            }
            Err(e) => tracing::error!("Counter snapshot failed: {}", e),
        }
    }

    connection.close();
    SegmentDirectory::global().withdraw(SEGMENT);
}

/// Write `requests` client requests, each with one backend fetch, inside
/// a single session
fn write_traffic(segment: &MemorySegment, version: FormatVersion, requests: u64) -> vslog::Result<()> {
    let tag = |name: &str| tag_index(name).unwrap_or(0);
    let sess = 1000;

    segment.write(version, tag("Begin"), sess, Side::Client, "sess 0 HTTP/1")?;
    segment.write(version, tag("SessOpen"), sess, Side::Client, "127.0.0.1 50000 a0")?;
    segment.set_counter("MAIN", "", "sess_conn", 1);

    for n in 0..requests {
        let req = sess + 1 + n * 2;
        let bereq = req + 1;
        let url = format!("/item/{}", n);

        segment.write(version, tag("Begin"), req, Side::Client, &format!("req {} rxreq", sess))?;
        segment.write(version, tag("ReqMethod"), req, Side::Client, "GET")?;
        segment.write(version, tag("ReqURL"), req, Side::Client, &url)?;
        segment.write(version, tag("ReqHeader"), req, Side::Client, "Host: demo.local")?;
        segment.write(version, tag("Link"), req, Side::Client, &format!("bereq {} fetch", bereq))?;

        segment.write(version, tag("Begin"), bereq, Side::Backend, &format!("bereq {} fetch", req))?;
        segment.write(version, tag("BereqURL"), bereq, Side::Backend, &url)?;
        segment.write(version, tag("BerespStatus"), bereq, Side::Backend, "200")?;
        segment.write(version, tag("End"), bereq, Side::Backend, "")?;

        segment.write(version, tag("RespStatus"), req, Side::Client, "200")?;
        segment.write(version, tag("End"), req, Side::Client, "")?;

        segment.add_counter("MAIN", "", "client_req", 1);
        segment.add_counter("MAIN", "", "backend_req", 1);
        segment.add_counter("VBE", "boot.default", "req", 1);
        thread::sleep(Duration::from_millis(5));
    }

    segment.write(version, tag("SessClose"), sess, Side::Client, "REM_CLOSE 0.1")?;
    segment.write(version, tag("End"), sess, Side::Client, "")?;
    segment.write(version, tag("CLI"), 0, Side::None, "Rd ping")?;
    segment.write(version, tag("CLI"), 0, Side::None, "Wr 200 PONG")?;
    Ok(())
}
