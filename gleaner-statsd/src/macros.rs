/// Emits a metric through the current client.
///
/// Does nothing if no client is configured. See the [crate-level documentation](crate) for
/// examples.
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        match $value {
            value if value != 0 => {
                $crate::with_client(|client| {
                    use $crate::_pred::*;
                    client.send_metric(
                        client.count_with_tags(&$crate::CounterMetric::name(&$id), value)
                            $(.with_tag(stringify!($($k).*), $v))*
                    )
                })
            }
            _ => {}
        };
    };

    (gauge($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.gauge_with_tags(&$crate::GaugeMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    (distribution($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.distribution_with_tags(&$crate::DistributionMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // Durations go out as fractional milliseconds rather than cadence's nanoseconds.
    (timer($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.distribution_with_tags(
                    &$crate::TimerMetric::name(&$id),
                    $value.as_nanos() as f64 / 1e6,
                )
                $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    (timer($id:expr), $($($k:ident).* = $v:expr,)* $block:block) => {{
        let started = std::time::Instant::now();
        let rv = { $block };
        $crate::metric!(timer($id) = started.elapsed() $(, $($k).* = $v)*);
        rv
    }};
}
