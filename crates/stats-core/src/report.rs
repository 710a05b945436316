use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::aggregate::{Snapshot, SnapshotKind};
use crate::config::Config;
use crate::counters::{Protocol, ProtocolCounters};
use crate::error::StatsError;

pub const CSV_HEADER: &str =
    "RunTime(sec),Appl,Clients,Req,1xx,2xx,3xx,4xx,5xx,Err,T-Err,D,D-2xx,Ti,To";
pub const CSV_FOOTER: &str = "*, *, *, *, *, *, *, *, *, *, *, *, *, *";

const CLEAR_SCREEN: &str = "\x1b[2J";
const RULE: &str =
    "--------------------------------------------------------------------------------";
const DOUBLE_RULE: &str =
    "=================================================================================";

/// Bytes per second over `period_ms`, with the period truncated to whole seconds
/// and never less than one.
pub fn throughput(bytes: u64, period_ms: u64) -> u64 {
    bytes / (period_ms / 1000).max(1)
}

pub fn console_line(protocol: Protocol, c: &ProtocolCounters, period_ms: u64) -> String {
    format!(
        "{}Req:{},1xx:{},2xx:{},3xx:{},4xx:{},5xx:{},Err:{},T-Err:{},D:{}ms,D-2xx:{}ms,Ti:{}B/s,To:{}B/s",
        protocol.label(),
        c.requests,
        c.resp_1xx,
        c.resp_2xx,
        c.resp_3xx,
        c.resp_4xx,
        c.resp_5xx,
        c.other_errors,
        c.timeout_errors,
        c.delay_ms(),
        c.delay_2xx_ms(),
        throughput(c.bytes_in, period_ms),
        throughput(c.bytes_out, period_ms),
    )
}

fn wall_time(timestamp_ms: u64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_default()
}

/// Console frame for a snapshot.
///
/// Interval frames clear the screen and show the latest deltas followed by the
/// since-start summary. The final frame shows the last deltas and the totals of the
/// whole run.
pub fn render_console(snapshot: &Snapshot, batch_name: &str) -> String {
    let mut out = String::new();
    let mut line = |s: &str| {
        out.push_str(s);
        out.push('\n');
    };

    let seconds_run = snapshot.elapsed_secs();
    let sessions_total = snapshot.operations_total.sessions_started;

    match snapshot.kind {
        SnapshotKind::Interval => {
            let caps_current =
                snapshot.operations_delta.sessions_started * 1000 / snapshot.period_ms;
            let runs = seconds_run.max(1);

            line(&format!(
                "{CLEAR_SCREEN}============  loading batch is: {batch_name:<10.10} ============  {}",
                wall_time(snapshot.timestamp_ms)
            ));
            line(RULE);
            line(&format!(
                "Interval stats (latest:{} sec, clients:{}, CAPS-curr:{}):",
                snapshot.period_ms / 1000,
                snapshot.active_clients,
                caps_current
            ));
            for pair in &snapshot.protocols {
                line(&console_line(pair.protocol, &pair.delta, snapshot.period_ms));
            }
            line(RULE);
            line(&format!(
                "Summary stats (runs:{} secs, CAPS-average:{}):",
                runs,
                sessions_total / runs
            ));
            for pair in &snapshot.protocols {
                line(&console_line(pair.protocol, &pair.total, runs * 1000));
            }
            line(DOUBLE_RULE);
            line(&format!(" clients: curr[{}]", snapshot.active_clients));
            line(DOUBLE_RULE);
        }
        SnapshotKind::Final => {
            for pair in &snapshot.protocols {
                line(&console_line(pair.protocol, &pair.delta, snapshot.period_ms));
            }
            line("");
            line(DOUBLE_RULE);
            line(&format!("End of the test for batch: {batch_name:<10.10}"));
            line(DOUBLE_RULE);
            line("");

            if seconds_run == 0 {
                line("less than 1 second duration test without statistics.");
            } else {
                line(&format!(
                    "Test total duration was {} seconds and CAPS average {}:",
                    seconds_run,
                    sessions_total / seconds_run
                ));
                for pair in &snapshot.protocols {
                    line(&console_line(pair.protocol, &pair.total, seconds_run * 1000));
                }
            }
        }
    }

    out
}

pub fn csv_row(
    seconds: u64,
    protocol: Protocol,
    clients: u64,
    c: &ProtocolCounters,
    period_ms: u64,
) -> String {
    format!(
        "{}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}",
        seconds,
        protocol.label(),
        clients,
        c.requests,
        c.resp_1xx,
        c.resp_2xx,
        c.resp_3xx,
        c.resp_4xx,
        c.resp_5xx,
        c.other_errors,
        c.timeout_errors,
        c.delay_ms(),
        c.delay_2xx_ms(),
        throughput(c.bytes_in, period_ms),
        throughput(c.bytes_out, period_ms),
    )
}

/// Statistics file lines for a snapshot.
///
/// Interval snapshots give one delta row per protocol family. The final snapshot
/// gives the separator, a repeated header and one whole-run row per family.
pub fn render_csv(snapshot: &Snapshot) -> Vec<String> {
    match snapshot.kind {
        SnapshotKind::Interval => snapshot
            .protocols
            .iter()
            .map(|pair| {
                csv_row(
                    snapshot.elapsed_secs(),
                    pair.protocol,
                    snapshot.active_clients,
                    &pair.delta,
                    snapshot.period_ms,
                )
            })
            .collect(),
        SnapshotKind::Final => {
            let run_ms = snapshot.elapsed_ms.max(1);
            let mut lines = vec![CSV_FOOTER.to_string(), CSV_HEADER.to_string()];
            lines.extend(snapshot.protocols.iter().map(|pair| {
                csv_row(
                    run_ms / 1000,
                    pair.protocol,
                    snapshot.active_clients,
                    &pair.total,
                    run_ms,
                )
            }));
            lines
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonStat {
    pub timestamp: u64,
    pub total_clients: u64,
    pub seconds_run: u64,
    pub total_requests: u64,
    #[serde(rename = "1xxRequests")]
    pub requests_1xx: u64,
    #[serde(rename = "2xxRequests")]
    pub requests_2xx: u64,
    #[serde(rename = "3xxRequests")]
    pub requests_3xx: u64,
    #[serde(rename = "4xxRequests")]
    pub requests_4xx: u64,
    #[serde(rename = "5xxRequests")]
    pub requests_5xx: u64,
    pub total_data_in: u64,
    pub total_data_out: u64,
    pub avg_time: u64,
    #[serde(rename = "avgTime2xx")]
    pub avg_time_2xx: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonUrl {
    pub url: String,
    pub url_short_name: String,
    pub success: u64,
    pub fail: u64,
    pub timeout: u64,
    pub min: u64,
    pub max: u64,
    pub last: u64,
    pub avg: u64,
    #[serde(rename = "min2xx")]
    pub min_2xx: u64,
    #[serde(rename = "max2xx")]
    pub max_2xx: u64,
    #[serde(rename = "last2xx")]
    pub last_2xx: u64,
    #[serde(rename = "avg2xx")]
    pub avg_2xx: u64,
    pub total_requests: u64,
    #[serde(rename = "1xxRequests")]
    pub requests_1xx: u64,
    #[serde(rename = "2xxRequests")]
    pub requests_2xx: u64,
    #[serde(rename = "3xxRequests")]
    pub requests_3xx: u64,
    #[serde(rename = "4xxRequests")]
    pub requests_4xx: u64,
    #[serde(rename = "5xxRequests")]
    pub requests_5xx: u64,
    pub total_data_in: u64,
    pub total_data_out: u64,
}

#[derive(Debug, Serialize)]
pub struct JsonDocument {
    pub stat: JsonStat,
    pub urls: Vec<JsonUrl>,
}

/// Machine-readable document over the since-start totals.
pub fn render_json(snapshot: &Snapshot) -> JsonDocument {
    // families are folded with the same weighted merge used across workers
    let combined = snapshot.combined_total();

    let ops = &snapshot.operations_total;
    let slot = |v: &[u64], i: usize| v.get(i).copied().unwrap_or(0);

    JsonDocument {
        stat: JsonStat {
            timestamp: snapshot.timestamp_ms,
            total_clients: snapshot.active_clients,
            seconds_run: snapshot.elapsed_secs(),
            total_requests: combined.requests,
            requests_1xx: combined.resp_1xx,
            requests_2xx: combined.resp_2xx,
            requests_3xx: combined.resp_3xx,
            requests_4xx: combined.resp_4xx,
            requests_5xx: combined.resp_5xx,
            total_data_in: combined.bytes_in,
            total_data_out: combined.bytes_out,
            avg_time: combined.delay_ms(),
            avg_time_2xx: combined.delay_2xx_ms(),
        },
        urls: snapshot
            .urls
            .iter()
            .enumerate()
            .map(|(i, row)| JsonUrl {
                url: row.url.clone(),
                url_short_name: row.short_name.clone(),
                success: slot(&ops.url_ok, i),
                fail: slot(&ops.url_failed, i),
                timeout: slot(&ops.url_timed_out, i),
                min: row.stats.min_ms,
                max: row.stats.max_ms,
                last: row.stats.last_ms,
                avg: row.stats.avg_ms,
                min_2xx: row.stats.min_2xx_ms,
                max_2xx: row.stats.max_2xx_ms,
                last_2xx: row.stats.last_2xx_ms,
                avg_2xx: row.stats.avg_2xx_ms,
                total_requests: row.stats.requests,
                requests_1xx: row.stats.resp_1xx,
                requests_2xx: row.stats.resp_2xx,
                requests_3xx: row.stats.resp_3xx,
                requests_4xx: row.stats.resp_4xx,
                requests_5xx: row.stats.resp_5xx,
                total_data_in: row.stats.bytes_in,
                total_data_out: row.stats.bytes_out,
            })
            .collect(),
    }
}

/// Per-URL success/failure/timeout table, delta next to total.
pub fn render_operations(snapshot: &Snapshot) -> String {
    let delta = &snapshot.operations_delta;
    let total = &snapshot.operations_total;

    let mut out = String::from(" Operations:\t\t Success\t\t Failed\t\t\tTimed out\n");
    if delta.slots() == 0 || delta.slots() != total.slots() {
        return out;
    }
    for i in 0..delta.slots() {
        let short_name = snapshot
            .urls
            .get(i)
            .map(|row| row.short_name.as_str())
            .unwrap_or("");
        out.push_str(&format!(
            "URL{}:{:<12.12}\t{:<6} {:<8}\t\t{:<6} {:<8}\t\t{:<6} {:<8}\n",
            i,
            short_name,
            delta.url_ok[i],
            total.url_ok[i],
            delta.url_failed[i],
            total.url_failed[i],
            delta.url_timed_out[i],
            total.url_timed_out[i],
        ));
    }
    out
}

/// Writes one line per virtual client slot into the client dump.
pub trait ClientDumper {
    fn client_slots(&self) -> usize;

    fn dump_client(&self, slot: usize, out: &mut dyn Write) -> io::Result<()>;
}

/// Which sinks a [`Reporter`] opens and where.
#[derive(Debug, Clone)]
pub struct ReporterOptions {
    pub batch_name: String,
    pub output_dir: PathBuf,
    pub statistics_file: bool,
    pub dump_opstats: bool,
    pub json: bool,
    pub dump_clients: bool,
}

impl From<&Config> for ReporterOptions {
    fn from(config: &Config) -> Self {
        Self {
            batch_name: config.batch.name.clone(),
            output_dir: config.reporting.output_dir.clone(),
            statistics_file: config.reporting.statistics_file,
            dump_opstats: config.reporting.dump_opstats,
            json: config.reporting.json,
            dump_clients: config.reporting.dump_clients,
        }
    }
}

impl ReporterOptions {
    fn path(&self, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.batch_name, extension))
    }

    pub fn statistics_path(&self) -> PathBuf {
        self.path("txt")
    }

    pub fn opstats_path(&self) -> PathBuf {
        self.path("ops")
    }

    pub fn clients_path(&self) -> PathBuf {
        self.path("ctx")
    }
}

type Sink = Box<dyn Write + Send>;

fn create_sink(path: &Path) -> Result<BufWriter<File>, StatsError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| StatsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn open_sink(path: &Path) -> Option<BufWriter<File>> {
    match create_sink(path) {
        Ok(sink) => Some(sink),
        Err(e) => {
            error!(error = %e, "skipping statistics sink");
            None
        }
    }
}

fn write_or_warn(sink: &mut dyn Write, what: &str, text: &str) {
    if let Err(e) = sink.write_all(text.as_bytes()).and_then(|_| sink.flush()) {
        warn!(sink = what, error = %e, "failed to write statistics");
    }
}

/// Sends snapshots to the console, the JSON stream and the statistics files.
pub struct Reporter {
    options: ReporterOptions,
    console: Sink,
    json: Option<Sink>,
    statistics: Option<BufWriter<File>>,
    opstats: Option<BufWriter<File>>,
}

impl Reporter {
    /// Reporter writing the console to stderr and JSON to stdout.
    pub fn open(options: ReporterOptions) -> Self {
        let json: Option<Sink> = if options.json {
            Some(Box::new(io::stdout()))
        } else {
            None
        };
        Self::with_writers(options, Box::new(io::stderr()), json)
    }

    /// Reporter with caller-supplied console and JSON writers. File sinks are opened
    /// here; one that cannot be opened is logged and skipped for the whole run.
    pub fn with_writers(options: ReporterOptions, console: Sink, json: Option<Sink>) -> Self {
        let mut statistics = if options.statistics_file {
            open_sink(&options.statistics_path())
        } else {
            None
        };
        if let Some(file) = statistics.as_mut() {
            write_or_warn(file, "statistics", &format!("{CSV_HEADER}\n"));
        }

        let opstats = if options.dump_opstats {
            open_sink(&options.opstats_path())
        } else {
            None
        };

        Self {
            options,
            console,
            json,
            statistics,
            opstats,
        }
    }

    pub fn options(&self) -> &ReporterOptions {
        &self.options
    }

    pub fn has_statistics_file(&self) -> bool {
        self.statistics.is_some()
    }

    /// Emit one snapshot to every open sink.
    pub fn report(&mut self, snapshot: &Snapshot) {
        let console = render_console(snapshot, &self.options.batch_name);
        write_or_warn(&mut self.console, "console", &console);

        if let Some(opstats) = self.opstats.as_mut() {
            write_or_warn(opstats, "opstats", &render_operations(snapshot));
        }

        if let Some(json) = self.json.as_mut() {
            match serde_json::to_string(&render_json(snapshot)) {
                Ok(doc) => write_or_warn(json, "json", &format!("{doc}\n")),
                Err(e) => warn!(error = %e, "failed to serialize statistics document"),
            }
        }

        if let Some(statistics) = self.statistics.as_mut() {
            let mut rows = render_csv(snapshot).join("\n");
            rows.push('\n');
            write_or_warn(statistics, "statistics", &rows);
        }
    }

    /// Emit the final snapshot, dump the client table and close every file sink.
    pub fn finish(&mut self, snapshot: &Snapshot, clients: &dyn ClientDumper) {
        self.report(snapshot);

        if self.options.dump_clients {
            self.dump_clients(clients);
        }

        self.statistics = None;
        self.opstats = None;

        let notice = self.exit_notice();
        write_or_warn(&mut self.console, "console", &notice);
        info!(batch = %self.options.batch_name, "statistics sinks closed");
    }

    fn dump_clients(&self, clients: &dyn ClientDumper) {
        let path = self.options.clients_path();
        let Some(mut out) = open_sink(&path) else {
            return;
        };

        let written = (0..clients.client_slots())
            .try_for_each(|slot| clients.dump_client(slot, &mut out))
            .and_then(|_| out.flush());
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "failed to write client dump");
        }
    }

    fn exit_notice(&self) -> String {
        let name = &self.options.batch_name;
        let mut notice = String::from("\nExited. For details look in the files:\n");
        if self.options.statistics_file {
            notice.push_str(&format!("- {name}.txt for loading statistics;\n"));
        }
        if self.options.dump_clients {
            notice.push_str(&format!("- {name}.ctx for virtual client based statistics;\n"));
        }
        if self.options.dump_opstats {
            notice.push_str(&format!("- {name}.ops for operational statistics;\n"));
        }
        notice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregator;
    use crate::counters::ResponseClass;
    use crate::urls::UrlTable;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Slots(usize);

    impl ClientDumper for Slots {
        fn client_slots(&self) -> usize {
            self.0
        }

        fn dump_client(&self, slot: usize, out: &mut dyn Write) -> io::Result<()> {
            writeln!(out, "client {slot}")
        }
    }

    fn options(dir: &Path) -> ReporterOptions {
        ReporterOptions {
            batch_name: "batch".to_string(),
            output_dir: dir.to_path_buf(),
            statistics_file: true,
            dump_opstats: true,
            json: true,
            dump_clients: true,
        }
    }

    fn aggregator() -> (Aggregator, Arc<crate::WorkerCounters>) {
        let urls = Arc::new(UrlTable::new([("http://localhost/index.html", "index")]));
        let mut agg = Aggregator::new(0, urls).unwrap();
        let worker = agg.add_worker().unwrap();
        (agg, worker)
    }

    #[test]
    fn test_throughput() {
        assert_eq!(throughput(100_000, 2_000), 50_000);
        assert_eq!(throughput(100_000, 0), 100_000);
        assert_eq!(throughput(100_000, 999), 100_000);
        assert_eq!(throughput(100_000, 2_999), 50_000);
    }

    #[test]
    fn test_console_line_format() {
        let c = ProtocolCounters {
            requests: 20,
            resp_2xx: 16,
            resp_5xx: 4,
            app_delay_avg: 100.4,
            app_delay_2xx_avg: 90.9,
            bytes_in: 100_000,
            bytes_out: 4_000,
            ..Default::default()
        };
        assert_eq!(
            console_line(Protocol::Http, &c, 2_000),
            "H/F   Req:20,1xx:0,2xx:16,3xx:0,4xx:0,5xx:4,Err:0,T-Err:0,D:100ms,D-2xx:90ms,Ti:50000B/s,To:2000B/s"
        );
    }

    #[test]
    fn test_csv_rows() {
        let c = ProtocolCounters {
            requests: 5,
            resp_2xx: 5,
            app_delay_avg: 12.0,
            app_delay_2xx_avg: 12.0,
            bytes_in: 3_000,
            ..Default::default()
        };
        assert_eq!(
            csv_row(9, Protocol::Https, 4, &c, 3_000),
            "9, H/F/S , 4, 5, 0, 5, 0, 0, 0, 0, 0, 12, 12, 1000, 0"
        );
        assert_eq!(CSV_FOOTER.split(", ").count(), 14);
    }

    #[test]
    fn test_interval_console_clears_screen() {
        let (mut agg, worker) = aggregator();
        worker.record_session_started();
        worker.record_session_started();
        worker.record_response(Protocol::Http, ResponseClass::Success, 10);

        let text = render_console(&agg.tick(2_000, 3), "batch");
        assert!(text.starts_with(CLEAR_SCREEN));
        assert!(text.contains("Interval stats (latest:2 sec, clients:3, CAPS-curr:1):"));
        assert!(text.contains("Summary stats (runs:2 secs, CAPS-average:1):"));
        assert!(text.contains("H/F   Req:1,"));
        assert!(text.contains("H/F/S Req:0,"));

        let text = render_console(&agg.finalize(2_500, 0), "batch");
        assert!(!text.contains(CLEAR_SCREEN));
        assert!(text.contains("End of the test for batch: batch"));
        assert!(text.contains("Test total duration was 2 seconds and CAPS average 1:"));
    }

    #[test]
    fn test_final_console_sub_second_run() {
        let (mut agg, _worker) = aggregator();
        let text = render_console(&agg.finalize(300, 0), "batch");
        assert!(text.contains("less than 1 second duration test without statistics."));
    }

    #[test]
    fn test_json_document() {
        let (mut agg, worker) = aggregator();
        worker.record_response(Protocol::Http, ResponseClass::Success, 10);
        worker.record_response(Protocol::Https, ResponseClass::ServerError, 70);
        worker.record_bytes(Protocol::Https, 800, 80);
        worker.record_url_ok(0);
        worker.record_url_failed(0);
        agg.urls()
            .get(0)
            .unwrap()
            .latency
            .record_response(ResponseClass::Success, 10);

        let doc = serde_json::to_value(render_json(&agg.tick(4_000, 7))).unwrap();
        let stat = &doc["stat"];
        assert_eq!(stat["timestamp"], 4_000);
        assert_eq!(stat["totalClients"], 7);
        assert_eq!(stat["secondsRun"], 4);
        assert_eq!(stat["totalRequests"], 2);
        assert_eq!(stat["2xxRequests"], 1);
        assert_eq!(stat["5xxRequests"], 1);
        assert_eq!(stat["totalDataIn"], 800);
        assert_eq!(stat["avgTime"], 40);
        assert_eq!(stat["avgTime2xx"], 10);

        let url = &doc["urls"][0];
        assert_eq!(url["url"], "http://localhost/index.html");
        assert_eq!(url["urlShortName"], "index");
        assert_eq!(url["success"], 1);
        assert_eq!(url["fail"], 1);
        assert_eq!(url["timeout"], 0);
        assert_eq!(url["min2xx"], 10);
        assert_eq!(url["1xxRequests"], 0);
    }

    #[test]
    fn test_operations_table() {
        let (mut agg, worker) = aggregator();
        worker.record_url_ok(0);
        let text = render_operations(&agg.tick(1_000, 0));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("URL0:index       \t1      1       "));
    }

    #[test]
    fn test_three_ticks_then_shutdown_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let console = Captured::default();
        let json = Captured::default();
        let mut reporter = Reporter::with_writers(
            options(dir.path()),
            Box::new(console.clone()),
            Some(Box::new(json.clone())),
        );
        assert!(reporter.has_statistics_file());

        let (mut agg, worker) = aggregator();
        for tick in 1..=3u64 {
            for _ in 0..5 {
                worker.record_response(Protocol::Http, ResponseClass::Success, 10);
            }
            reporter.report(&agg.tick(tick * 1_000, 1));
        }
        let last = agg.finalize(3_400, 0);
        assert_eq!(last.protocol(Protocol::Http).unwrap().total.requests, 15);
        reporter.finish(&last, &Slots(3));

        let stats = std::fs::read_to_string(dir.path().join("batch.txt")).unwrap();
        let lines: Vec<_> = stats.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);

        let http_rows: Vec<u64> = lines[1..7]
            .iter()
            .filter(|l| l.contains("H/F   "))
            .map(|l| l.split(", ").next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(http_rows, vec![1, 2, 3]);

        let footer = lines.iter().position(|l| *l == CSV_FOOTER).unwrap();
        assert_eq!(footer, 7);
        assert_eq!(lines[footer + 1], CSV_HEADER);
        let summary = &lines[footer + 2..];
        assert_eq!(summary.len(), Protocol::ALL.len());
        assert!(summary[0].starts_with("3, H/F   , 0, 15, 0, 15,"));

        let dump = std::fs::read_to_string(dir.path().join("batch.ctx")).unwrap();
        assert_eq!(dump, "client 0\nclient 1\nclient 2\n");

        assert_eq!(json.text().lines().count(), 4);
        assert!(console.text().contains("Exited. For details look in the files:"));
        assert!(console.text().contains("- batch.ops for operational statistics;"));
    }

    #[test]
    fn test_unopenable_file_sinks_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").join("dir");
        let console = Captured::default();
        let json = Captured::default();
        let mut reporter = Reporter::with_writers(
            options(&missing),
            Box::new(console.clone()),
            Some(Box::new(json.clone())),
        );
        assert!(!reporter.has_statistics_file());

        let (mut agg, _worker) = aggregator();
        reporter.report(&agg.tick(1_000, 0));
        assert!(console.text().contains("Interval stats"));
        assert_eq!(json.text().lines().count(), 1);

        // the client dump cannot be opened either; shutdown still completes
        reporter.finish(&agg.finalize(1_500, 0), &Slots(2));
        assert!(!missing.join("batch.ctx").exists());
        assert_eq!(json.text().lines().count(), 2);
        assert!(console.text().contains("End of the test for batch: batch"));
        assert!(console.text().contains("Exited. For details look in the files:"));
    }

    #[test]
    fn test_create_sink_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("batch.txt");
        match create_sink(&path) {
            Err(StatsError::Io { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected an io error, got {:?}", other.map(|_| ())),
        }
    }
}
