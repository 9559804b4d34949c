//! Process entry point: installs logging, builds the node, registers its message handlers, and
//! spawns the three cooperating activities described in the concurrency model — dispatch,
//! maintenance, and election — as `std::thread`s sharing the node behind one mutex.

use std::sync::Arc;
use std::thread;

use raft_kv::config::Config;
use raft_kv::raft_node::RaftNode;
use raft_kv::transport::Transport;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    let transport = Arc::new(Transport::new());
    let node = RaftNode::new(Arc::clone(&transport), config);

    if let Err(e) = node.register_handlers() {
        panic!("failed to register message handlers: {}", e);
    }

    {
        let node = Arc::clone(&node);
        thread::spawn(move || node.run_maintenance_loop());
    }
    {
        let node = Arc::clone(&node);
        thread::spawn(move || node.run_election_loop());
    }

    // The dispatch loop blocks reading stdin until EOF; the harness is expected to kill the
    // process rather than ask for a graceful shutdown.
    transport.run_dispatch_loop();
}
