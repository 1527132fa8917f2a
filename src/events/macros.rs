/// Emit a `SystemEvent` with a fresh correlation id.
///
/// `emit_system_event!("node", LogLevel::Info, "startup", Some(detail))`
#[macro_export]
macro_rules! emit_system_event {
    ($component:expr, $level:expr, $action:expr, $detail:expr) => {{
        let mut meta = $crate::events::dispatcher::meta($component, $level);
        meta.corr_id = Some($crate::events::dispatcher::correlation_id());
        $crate::events::dispatcher::emit($crate::events::model::LogEvent::System(
            $crate::events::model::SystemEvent {
                meta,
                action: $action.to_string(),
                detail: $detail,
            },
        ));
    }};
}

/// Emit a `SessionEvent`; `$peer` is truncated for logs by the caller.
#[macro_export]
macro_rules! emit_session_event {
    ($level:expr, $action:expr, $peer:expr, $detail:expr) => {{
        let meta = $crate::events::dispatcher::meta("session_store", $level);
        $crate::events::dispatcher::emit($crate::events::model::LogEvent::Session(
            $crate::events::model::SessionEvent {
                meta,
                action: $action.to_string(),
                peer: $peer,
                detail: $detail,
            },
        ));
    }};
}
