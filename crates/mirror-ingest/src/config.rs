use std::path::PathBuf;

use clap::Parser;
use mirror_ingest_lib::GapPolicy;
use mirror_middleware::{ConsensusTimestamp, TopicId};

/// mirror-ingest: topic message feed → domain events
#[derive(Parser, Debug)]
#[command(name = "mirror-ingest")]
pub struct Config {
    /// Topic to consume, as shard.realm.num (or a bare topic number)
    #[arg(long, env = "MIRROR_TOPIC_ID")]
    pub topic_id: TopicId,

    /// JSON-lines capture of topic messages to replay
    #[arg(long, env = "MIRROR_REPLAY_FILE")]
    pub replay_file: PathBuf,

    /// Earliest consensus timestamp to deliver (seconds.nanos); 0 replays everything
    #[arg(long, env = "MIRROR_START_TIME", default_value = "0")]
    pub start_time: ConsensusTimestamp,

    /// Sequence position already covered by a verified running hash
    #[arg(long, env = "MIRROR_CHECKPOINT", default_value_t = 0)]
    pub checkpoint: u64,

    /// How the sequence position advances: increment or adopt-transport
    #[arg(long, env = "MIRROR_GAP_POLICY", default_value = "increment")]
    pub gap_policy: GapPolicy,

    /// Messages buffered between the transport and the pipeline
    #[arg(long, env = "MIRROR_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub channel_capacity: usize,

    /// Append domain events to this file instead of stdout
    #[arg(long, env = "MIRROR_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Metrics/health listen address
    #[arg(long, env = "MIRROR_LISTEN_ADDR", default_value = "0.0.0.0:9090")]
    pub listen_addr: String,

    /// Emit logs as JSON
    #[arg(long, env = "MIRROR_LOG_JSON")]
    pub log_json: bool,
}
