// Frame ids attached to published odometry

/// Prefix `frame` the way the odometry publisher labels it.
///
/// An explicit prefix wins; with prefixing enabled but no prefix given, the
/// namespace (without its leading `/`) is used instead.
pub fn compose(prefix_enable: bool, prefix: &str, namespace: &str, frame: &str) -> String {
    if !prefix_enable {
        return frame.to_string();
    }

    let prefix = if prefix.is_empty() {
        namespace.trim_start_matches('/')
    } else {
        prefix
    };

    if prefix.is_empty() {
        frame.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), frame)
    }
}
