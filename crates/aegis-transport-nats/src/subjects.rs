//! Subject-name builders (spec §4.1, §6.1). Centralized here so the
//! runtime/router and this adapter never compose a subject string ad hoc
//! in more than one place.

pub fn rpc(service: &str, method: &str) -> String {
    format!("rpc.{service}.{method}")
}

pub fn event(service: &str, pattern: &str) -> String {
    format!("events.{service}.{pattern}")
}

pub fn command(service: &str, name: &str) -> String {
    format!("commands.{service}.{name}")
}

pub fn command_progress(service: &str, name: &str, message_id: &str) -> String {
    format!("commands.{service}.{name}.progress.{message_id}")
}

pub fn command_result(service: &str, name: &str, message_id: &str) -> String {
    format!("commands.{service}.{name}.result.{message_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_normative_subjects() {
        assert_eq!(rpc("orders", "get"), "rpc.orders.get");
        assert_eq!(event("orders", "created"), "events.orders.created");
        assert_eq!(command("orders", "rebalance"), "commands.orders.rebalance");
        assert_eq!(
            command_progress("orders", "rebalance", "m1"),
            "commands.orders.rebalance.progress.m1"
        );
        assert_eq!(
            command_result("orders", "rebalance", "m1"),
            "commands.orders.rebalance.result.m1"
        );
    }
}
