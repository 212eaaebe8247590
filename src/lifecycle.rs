//! Activation and deactivation markers.

use crate::script::ENGINE_VERSION;
use crate::sink::{LogSink, tagged};
use chrono::Local;

fn now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn on_activate(sink: &dyn LogSink) {
    tagged(sink, format!("Plugin activated at {}", now()));
    tagged(
        sink,
        format!(
            "Runtime Version: {} ({}/{})",
            ENGINE_VERSION,
            std::env::consts::OS,
            std::env::consts::ARCH
        ),
    );
    tagged(sink, format!("Host Version: {}", env!("CARGO_PKG_VERSION")));
}

pub fn on_deactivate(sink: &dyn LogSink) {
    tagged(sink, format!("Plugin deactivated at {}", now()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::MemorySink;

    #[test]
    fn activation_writes_three_tagged_lines() {
        let sink = MemorySink::default();
        on_activate(&sink);

        let lines = sink.tagged();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("[Error Log Test] Plugin activated at "));
        assert!(lines[1].contains(ENGINE_VERSION));
        assert!(lines[2].ends_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn deactivation_writes_one_line() {
        let sink = MemorySink::default();
        on_deactivate(&sink);
        assert_eq!(sink.tagged().len(), 1);
    }
}
