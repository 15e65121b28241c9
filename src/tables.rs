use chrono::{DateTime, Local, Utc};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    core::{analyzer::PriceThresholds, decision::Decision, forecast::PriceForecast},
    dispatch::dispatcher::Command,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

pub fn build_forecast_table(
    forecast: &PriceForecast,
    now: DateTime<Utc>,
    thresholds: &PriceThresholds,
) -> Table {
    let current = forecast.current(now).map(|point| point.starts_at);
    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "Price", "Level"]);
    for point in forecast.points() {
        let starts_at = point.starts_at.with_timezone(&Local);
        let start = Cell::new(starts_at.format("%H:%M"));
        table.add_row(vec![
            Cell::new(starts_at.format("%b %d")).add_attribute(Attribute::Dim),
            if current == Some(point.starts_at) {
                start.add_attribute(Attribute::Bold).fg(Color::Cyan)
            } else {
                start
            },
            Cell::new(point.price).set_alignment(CellAlignment::Right).fg(
                if point.price <= thresholds.charge {
                    Color::Green
                } else if point.price >= thresholds.discharge {
                    Color::Red
                } else {
                    Color::Reset
                },
            ),
            Cell::new(point.level).fg(point.level.color()),
        ]);
    }
    table
}

pub fn build_thresholds_table(thresholds: &PriceThresholds) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Current", "Charge", "Discharge", "Min", "Average", "Max", "Volatility"]);
    table.add_row(vec![
        Cell::new(thresholds.current).fg(if thresholds.current <= thresholds.charge {
            Color::Green
        } else {
            Color::Reset
        }),
        Cell::new(thresholds.charge).fg(Color::Green),
        Cell::new(thresholds.discharge).fg(Color::Red),
        Cell::new(thresholds.min).add_attribute(Attribute::Dim),
        Cell::new(thresholds.average),
        Cell::new(thresholds.max).add_attribute(Attribute::Dim),
        Cell::new(format!("{:.2}", thresholds.volatility)).set_alignment(CellAlignment::Right),
    ]);
    table
}

pub fn build_decision_table(decision: &Decision) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Time", "Action", "Strategy", "Expected", "Reasons"]);
    table.add_row(vec![
        Cell::new(decision.timestamp.with_timezone(&Local).format("%H:%M:%S"))
            .add_attribute(Attribute::Dim),
        Cell::new(decision.action).fg(decision.action.color()),
        decision.strategy.map_or_else(
            || Cell::new("-").add_attribute(Attribute::Dim),
            |strategy| Cell::new(strategy).fg(strategy.color()),
        ),
        decision.strategy.map_or_else(
            || Cell::new("-").add_attribute(Attribute::Dim),
            |strategy| Cell::new(strategy.expected_improvement()).add_attribute(Attribute::Dim),
        ),
        Cell::new(decision.reasons.join("\n")),
    ]);
    table
}

pub fn build_commands_table(commands: &[Command]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Inverter", "Topic", "Value", "Sent"]);
    for command in commands {
        table.add_row(vec![
            Cell::new(&command.inverter_id),
            Cell::new(&command.topic).add_attribute(Attribute::Dim),
            Cell::new(&command.value),
            if command.success {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("failed").fg(Color::Red)
            },
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            analyzer::Analyzer,
            decision::Action,
            forecast::tests::{DAY_PRICES, hourly, midnight},
            strategy::Strategy,
        },
        prelude::*,
    };

    #[test]
    fn test_forecast_table_lists_every_point() -> Result {
        let forecast = hourly(&DAY_PRICES);
        let thresholds = Analyzer::default().analyze(&forecast, midnight())?;
        let table = build_forecast_table(&forecast, midnight(), &thresholds);
        assert_eq!(table.row_iter().count(), DAY_PRICES.len());
        Ok(())
    }

    #[test]
    fn test_decision_table_reports_expected_improvement() {
        let decision = Decision::new(Action::ChargeGrid, midnight())
            .because("cheap")
            .with_strategy(Strategy::Hybrid);
        let table = build_decision_table(&decision).to_string();
        assert!(table.contains(Strategy::Hybrid.expected_improvement()), "{table}");
        assert!(table.contains("cheap"), "{table}");
    }
}
