pub mod dashboard;
pub mod feeds;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod poller;
pub mod schedule;
pub mod stats;
pub mod store;
pub mod training;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
