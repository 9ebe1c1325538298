use crate::db::LatencyType;

pub struct PlotFmt;

impl PlotFmt {
    pub fn latency_name(latency: LatencyType) -> &'static str {
        match latency {
            LatencyType::Mean => "Average",
            LatencyType::Median => "Median",
            LatencyType::P95 => "95 perc.",
            LatencyType::P99 => "99 perc.",
            LatencyType::Max => "Max",
        }
    }

    pub fn latency_label(latency: LatencyType) -> String {
        format!("{} latency (ms)", Self::latency_name(latency))
    }

    pub fn throughput_label() -> &'static str {
        "Records per second (x$10^6$)"
    }

    pub fn time_label() -> &'static str {
        "Time (sec)"
    }

    pub fn cdf_label() -> &'static str {
        "CDF"
    }

    pub fn color(index: usize) -> &'static str {
        const COLORS: [&str; 9] = [
            "#2b8cbe", "#cc4c02", "#fe9929", "#7bccc4", "#052538", "#6C7F63",
            "#ED3232", "#CC00CC", "#008837",
        ];
        COLORS[index % COLORS.len()]
    }

    // bars are drawn in grey
    pub fn grey(index: usize) -> &'static str {
        const GREYS: [&str; 6] =
            ["#555555", "#777777", "#999999", "#aaaaaa", "#bbbbbb", "#cccccc"];
        GREYS[index % GREYS.len()]
    }

    pub fn marker(index: usize) -> &'static str {
        const MARKERS: [&str; 9] =
            ["o", "s", "^", "*", "d", "v", "3", "4", "+"];
        MARKERS[index % MARKERS.len()]
    }

    pub fn linestyle(index: usize) -> &'static str {
        const LINESTYLES: [&str; 4] = ["-", "--", "-.", ":"];
        LINESTYLES[index % LINESTYLES.len()]
    }

    // Possible values: {'/', '\', '|', '-', '+', 'x', 'o', 'O', '.', '*'}
    pub fn hatch(index: usize) -> &'static str {
        const HATCHES: [&str; 7] = ["/", "\\", "o", "-", "x", ".", "*"];
        HATCHES[index % HATCHES.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_labels() {
        assert_eq!(
            PlotFmt::latency_label(LatencyType::P95),
            "95 perc. latency (ms)"
        );
        assert_eq!(PlotFmt::latency_name(LatencyType::Mean), "Average");
    }

    #[test]
    fn styles_cycle() {
        assert_eq!(PlotFmt::marker(0), PlotFmt::marker(9));
        assert_eq!(PlotFmt::hatch(1), "\\");
        assert_eq!(PlotFmt::linestyle(5), "--");
        assert_ne!(PlotFmt::color(0), PlotFmt::color(1));
    }
}
