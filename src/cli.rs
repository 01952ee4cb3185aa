use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::test_type::TestType;

/// Design, launch and follow load tests on the performance service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the performance service
    #[arg(
        long,
        global = true,
        env = "PERF_SERVICE_URL",
        default_value = "http://localhost:5000"
    )]
    pub base_url: String,

    /// Seconds between live result polls
    #[arg(
        long,
        global = true,
        env = "PERF_POLL_INTERVAL",
        default_value_t = DEFAULT_POLL_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval: u64,

    /// Directory holding the run history file [default: ~/.perf_designer]
    #[arg(long, global = true, env = "PERF_HISTORY_DIR")]
    pub history_dir: Option<PathBuf>,

    /// More output on stderr, repeat for more detail
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit the run described by a run file and follow its live results
    Start {
        /// Path to the run file
        #[arg(short, long, default_value = "perf_run.toml")]
        path: PathBuf,

        /// Use this test type instead of the one in the run file
        #[arg(short, long)]
        test_type: Option<TestType>,

        /// Print the start response and exit without following the run
        #[arg(long)]
        no_follow: bool,
    },

    /// Follow the live results of an already started run
    Watch {
        test_id: String,
    },

    /// Show the most recent runs submitted from this machine
    History {
        #[arg(short, long, default_value_t = crate::history::HISTORY_CAP)]
        limit: usize,
    },

    /// Show which inputs the form offers for a combination of choices
    Form {
        #[arg(short, long, default_value = "ramp-up")]
        test_type: TestType,

        #[arg(short, long, default_value = "GET")]
        method: String,

        #[arg(short, long, default_value = "json")]
        payload_type: String,

        /// Pretend a data file has been selected, where the form offers one
        #[arg(long)]
        with_data_file: bool,
    },
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_start_with_override() {
        let cli = Cli::try_parse_from([
            "perf_designer",
            "--base-url",
            "http://perf:8080",
            "start",
            "-p",
            "soak.toml",
            "--test-type",
            "spike",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.base_url, "http://perf:8080");
        assert_eq!(cli.verbose, 2);
        let Command::Start {
            path,
            test_type,
            no_follow,
        } = cli.command
        else {
            panic!("expected start");
        };
        assert_eq!(path, PathBuf::from("soak.toml"));
        assert_eq!(test_type, Some(TestType::Spike));
        assert!(!no_follow);
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let result = Cli::try_parse_from(["perf_designer", "--poll-interval", "0", "watch", "x"]);
        assert!(result.is_err());
    }
}
