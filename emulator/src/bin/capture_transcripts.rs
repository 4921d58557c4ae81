use std::io;
use std::path::PathBuf;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, SessionOptions};

const TRANSCRIPT_DIR: &str = "transcripts";

struct Scenario {
    name: &'static str,
    maintenance: bool,
    script: &'static [&'static str],
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "short-press",
        maintenance: false,
        script: &["press", "wait 200", "release", "wait 1000", "status", "wait 9000", "status"],
    },
    Scenario {
        name: "long-press",
        maintenance: false,
        script: &["press", "wait 3200", "status", "wait 2000", "release", "wait 200", "status"],
    },
    Scenario {
        name: "maintenance-exit",
        maintenance: true,
        script: &["wait 1000", "press", "wait 5200", "release", "wait 200", "status"],
    },
    Scenario {
        name: "update-transfer",
        maintenance: true,
        script: &[
            "press",
            "wait 200",
            "transfer start",
            "wait 200",
            "status",
            "transfer complete",
            "wait 100",
            "status",
        ],
    },
    Scenario {
        name: "slow-loop",
        maintenance: false,
        script: &["wait 100", "stall 6500", "wait 100", "status"],
    },
];

fn main() -> io::Result<()> {
    for scenario in SCENARIOS {
        record_scenario(scenario)?;
    }
    Ok(())
}

fn record_scenario(scenario: &Scenario) -> io::Result<()> {
    let options = SessionOptions {
        maintenance: scenario.maintenance,
        seed: 1,
        radio_fitted: true,
        transcript: Some(PathBuf::from(TRANSCRIPT_DIR).join(format!("{}.log", scenario.name))),
    };
    let (mut session, _) = Session::start(options)?;
    for command in scenario.script {
        let _ = session.handle_command(command)?;
    }
    println!("{}: {} boots, {:?}", scenario.name, session.boots(), session.counters());
    Ok(())
}
