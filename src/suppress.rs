// Disclosure-control suppression of small counts.
//
// Two independent rules are used by the publication:
// - the HES-style rule for single count columns (star the band, round
//   above it to a base), and
// - the two-pass rule for population/vaccinated/coverage triplets on
//   sensitive indicators.
use crate::config::SuppressionBounds;
use crate::types::{Cell, Table};
use crate::util::round_to_base;

pub const SUPPRESSED: &str = "*";

/// Suppress a column of counts per HES disclosure-control guidance.
///
/// Values between `lower` and `upper` inclusive are replaced with the
/// `*` marker. Values above `upper` are rounded to the nearest `base`
/// (exact midpoints to the even multiple, see `util::round_to_base`).
/// Values below `lower` are left as they are, as are markers and nulls,
/// which makes the operation idempotent.
pub fn suppress_column(values: &[Cell], bounds: &SuppressionBounds) -> Vec<Cell> {
    values
        .iter()
        .map(|cell| match cell.as_number() {
            Some(n) if n >= bounds.lower && n <= bounds.upper => {
                Cell::Text(SUPPRESSED.to_string())
            }
            Some(n) if n > bounds.upper => Cell::Number(round_to_base(n, bounds.base)),
            _ => cell.clone(),
        })
        .collect()
}

/// Two-pass suppression for sensitive population/vaccinated/coverage
/// triplets:
/// - eligible population of 1 or 2: suppress all three fields;
/// - population above 2 with 0 or 1 vaccinated: suppress vaccinated and
///   coverage, leaving the population visible.
pub fn suppress_triplet(
    table: &mut Table,
    population_col: &str,
    vaccinated_col: &str,
    coverage_col: &str,
) {
    let (Some(pop), Some(vac), Some(cov)) = (
        table.value_position(population_col),
        table.value_position(vaccinated_col),
        table.value_position(coverage_col),
    ) else {
        return;
    };

    for row in &mut table.rows {
        let population = row.values[pop].as_number();
        let vaccinated = row.values[vac].as_number();

        let star = Cell::Text(SUPPRESSED.to_string());
        match (population, vaccinated) {
            (Some(p), _) if p == 1.0 || p == 2.0 => {
                row.values[pop] = star.clone();
                row.values[vac] = star.clone();
                row.values[cov] = star;
            }
            (Some(p), Some(v)) if p > 2.0 && v <= 1.0 => {
                row.values[vac] = star.clone();
                row.values[cov] = star;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{columns, TableRow};

    fn bounds() -> SuppressionBounds {
        SuppressionBounds::default()
    }

    fn numbers(values: &[f64]) -> Vec<Cell> {
        values.iter().map(|&v| Cell::Number(v)).collect()
    }

    #[test]
    fn suppression_scenario_from_hes_guidance() {
        let input = numbers(&[0.0, 1.0, 4.0, 7.0, 8.0, 12.0, 16.0, 21.0, 101.0]);
        let expected = vec![
            Cell::Number(0.0),
            Cell::Text("*".to_string()),
            Cell::Text("*".to_string()),
            Cell::Text("*".to_string()),
            Cell::Number(10.0),
            Cell::Number(10.0),
            Cell::Number(15.0),
            Cell::Number(20.0),
            Cell::Number(100.0),
        ];
        assert_eq!(suppress_column(&input, &bounds()), expected);
    }

    #[test]
    fn suppression_is_idempotent() {
        let input = numbers(&[0.0, 3.0, 9.0, 23.0]);
        let once = suppress_column(&input, &bounds());
        let twice = suppress_column(&once, &bounds());
        assert_eq!(once, twice);
    }

    #[test]
    fn nulls_are_not_suppressed() {
        let input = vec![Cell::Null, Cell::Number(5.0)];
        let out = suppress_column(&input, &bounds());
        assert_eq!(out[0], Cell::Null);
        assert_eq!(out[1], Cell::Text("*".to_string()));
    }

    fn triplet_table(rows: &[(f64, f64, Option<f64>)]) -> Table {
        let mut table = Table::new(
            columns(&["Org_Name"]),
            columns(&["Population", "Vaccinated", "Coverage"]),
        );
        for (i, &(p, v, c)) in rows.iter().enumerate() {
            table.rows.push(TableRow {
                labels: vec![format!("Org {i}")],
                values: vec![
                    Cell::Number(p),
                    Cell::Number(v),
                    c.map_or(Cell::Null, Cell::Number),
                ],
            });
        }
        table
    }

    #[test]
    fn triplet_rule_suppresses_tiny_populations_entirely() {
        let mut table = triplet_table(&[(2.0, 1.0, Some(50.0))]);
        suppress_triplet(&mut table, "Population", "Vaccinated", "Coverage");
        let star = Cell::Text("*".to_string());
        assert_eq!(table.rows[0].values, vec![star.clone(), star.clone(), star]);
    }

    #[test]
    fn triplet_rule_keeps_population_when_only_vaccinated_is_low() {
        let mut table = triplet_table(&[(10.0, 1.0, Some(10.0)), (10.0, 0.0, Some(0.0))]);
        suppress_triplet(&mut table, "Population", "Vaccinated", "Coverage");
        let star = Cell::Text("*".to_string());
        for row in &table.rows {
            assert_eq!(row.values[0], Cell::Number(10.0));
            assert_eq!(row.values[1], star);
            assert_eq!(row.values[2], star);
        }
    }

    #[test]
    fn triplet_rule_leaves_ordinary_rows_alone() {
        let mut table = triplet_table(&[(120.0, 100.0, Some(83.3))]);
        suppress_triplet(&mut table, "Population", "Vaccinated", "Coverage");
        assert_eq!(
            table.rows[0].values,
            vec![
                Cell::Number(120.0),
                Cell::Number(100.0),
                Cell::Number(83.3)
            ]
        );
    }
}
