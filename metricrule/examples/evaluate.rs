use std::env;
use std::fs;

use getopts::Options;
use metricrule::{facade, Context, MetricRules};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt().with_ansi(true).with_level(true).init();

    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = opts();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            error!("Failed to parse command line args: {}", f);
            return;
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return;
    }

    let (Some(config_path), Some(payload_path)) =
        (matches.opt_str("config"), matches.opt_str("payload"))
    else {
        print_usage(program, &opts);
        return;
    };

    let context = match matches.opt_str("context").as_deref() {
        None | Some("input") => Context::Input,
        Some("output") => Context::Output,
        Some(other) => {
            error!("Unknown context '{}', expected 'input' or 'output'.", other);
            return;
        }
    };

    let rules = match MetricRules::from_path(&config_path) {
        Ok(rules) => rules,
        Err(e) => {
            error!(path = %config_path, error = %e, "Failed to load metric configuration.");
            return;
        }
    };

    let payload = match fs::read_to_string(&payload_path) {
        Ok(payload) => payload,
        Err(e) => {
            error!(path = %payload_path, error = %e, "Failed to read payload.");
            return;
        }
    };

    for (context, spec) in rules.all_specs().iter() {
        info!(%context, %spec, "Derived instrument.");
    }

    let evaluation = match rules.evaluate(context, &payload) {
        Ok(evaluation) => evaluation,
        Err(e) => {
            error!(error = %e, "Failed to evaluate payload.");
            return;
        }
    };

    for (spec, instances) in evaluation.iter() {
        for instance in instances {
            let labels = instance
                .labels()
                .iter()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect::<Vec<_>>()
                .join(",");
            info!(
                instrument = spec.name(),
                value = %instance.value(),
                labels = %labels,
                "Evaluated instance."
            );
        }
    }
    for skipped in evaluation.skipped() {
        info!(
            metric = %skipped.name,
            reason = skipped.error.reason(),
            error = %skipped.error,
            "Skipped metric."
        );
    }

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    facade::describe(&recorder, rules.all_specs());
    facade::record(&recorder, &evaluation);
    facade::record_skipped(&recorder, &evaluation);

    for (key, _, _, value) in snapshotter.snapshot().into_vec() {
        let value = match value {
            DebugValue::Counter(count) => count.to_string(),
            DebugValue::Gauge(gauge) => gauge.into_inner().to_string(),
            DebugValue::Histogram(values) => format!("{:?}", values),
        };
        println!("{:?} {} = {}", key.kind(), key.key(), value);
    }
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} --config FILE --payload FILE [options]", program);
    print!("{}", opts.usage(&brief));
}

pub fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("c", "config", "path to the JSON metric configuration", "FILE");
    opts.optopt("p", "payload", "path to the JSON payload to evaluate", "FILE");
    opts.optopt("x", "context", "context of the payload (default: input)", "input|output");
    opts.optflag("h", "help", "print this help menu");

    opts
}
