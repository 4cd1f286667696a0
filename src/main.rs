//! Agent-Shield Core - Main Entry Point
//!
//! Wires the detection loop (store, bus, intel, monitor, kill switch) and
//! runs the gateway connector on its own thread. Transcript adapters and
//! dashboards live outside this process boundary and drive the monitor's
//! intercept operations.

mod logic;
pub mod constants;

use std::sync::Arc;

use logic::events::EventBus;
use logic::gateway::{self, GatewayConfig, GatewayConnector};
use logic::intel::ThreatIntel;
use logic::kill_switch::KillSwitch;
use logic::monitor::RuntimeMonitor;
use logic::policy::SecurityPolicy;
use logic::store::{SessionStore, SqliteStore};

fn load_policy() -> SecurityPolicy {
    let Some(path) = constants::get_policy_path() else {
        log::info!("No policy file configured, using defaults");
        return SecurityPolicy::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(json) => match SecurityPolicy::load_from_json(&json) {
            Ok(policy) => {
                log::info!("Loaded policy v{} from {:?}", policy.version, path);
                policy
            }
            Err(e) => {
                log::error!("Policy file {:?} is invalid ({}), using defaults", path, e);
                SecurityPolicy::default()
            }
        },
        Err(e) => {
            log::error!("Cannot read policy file {:?} ({}), using defaults", path, e);
            SecurityPolicy::default()
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", constants::APP_NAME, constants::APP_VERSION);

    let policy = load_policy();

    let store_path = constants::get_data_dir().join("agent-shield.db");
    let store: Arc<dyn SessionStore> = Arc::new(
        SqliteStore::open(&store_path).expect("Failed to open the session store"),
    );
    log::info!("Session store at {:?}", store_path);

    let bus = Arc::new(EventBus::new());
    let intel = Arc::new(ThreatIntel::new(store.clone()));
    let kill_switch = Arc::new(KillSwitch::new(store.clone(), bus.clone()));

    let monitor = Arc::new(RuntimeMonitor::new(
        policy,
        intel,
        kill_switch,
        store,
        bus.clone(),
    ));
    monitor.set_auto_kill(constants::is_auto_kill_enabled());
    log::info!("Runtime monitor ready: {}", monitor.status());

    // Remote-termination side: bus notifications drain into the gateway
    // connector on a dedicated runtime thread.
    let kill_notices = gateway::subscribe_kill_events(&bus);
    let gateway_addr = constants::get_gateway_addr();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to create tokio runtime for the gateway connector");

        rt.block_on(async {
            let connector = GatewayConnector::new(GatewayConfig::default());
            if let Err(e) = connector.connect(&gateway_addr).await {
                log::warn!(
                    "Gateway at {} unreachable ({}), remote termination degraded",
                    gateway_addr,
                    e
                );
            }
            connector.run_kill_listener(kill_notices).await;
        });
    });

    log::info!("{} running, awaiting interceptions", constants::APP_NAME);
    loop {
        std::thread::park();
    }
}
