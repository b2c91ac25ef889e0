use colored::Colorize;
use rust_decimal::Decimal;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

/// The two user-supplied run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub investment_amount: Decimal,
    pub risk_tolerance: f64,
}

/// Parsed parameters plus the reason defaults were substituted, if they were.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedParameters {
    pub parameters: Parameters,
    pub fallback: Option<String>,
}

/// Parse raw amount and risk strings.
///
/// An empty string selects that value's default. If either value is
/// malformed (non-numeric, non-finite, amount not positive, negative risk)
/// both values revert to `defaults` and `fallback` says why.
pub fn parse_parameters(amount: &str, risk: &str, defaults: &Parameters) -> ParsedParameters {
    let amount = amount.trim();
    let risk = risk.trim();

    let parsed_amount = if amount.is_empty() {
        Ok(defaults.investment_amount)
    } else {
        Decimal::from_str(amount)
            .or_else(|_| Decimal::from_scientific(amount))
            .map_err(|_| format!("investment amount '{}' is not a number", amount))
            .and_then(|a| {
                if a > Decimal::ZERO {
                    Ok(a)
                } else {
                    Err(format!("investment amount {} must be positive", a))
                }
            })
    };

    let parsed_risk = if risk.is_empty() {
        Ok(defaults.risk_tolerance)
    } else {
        risk.parse::<f64>()
            .map_err(|_| format!("max risk '{}' is not a number", risk))
            .and_then(|r| {
                if r.is_finite() && r >= 0.0 {
                    Ok(r)
                } else {
                    Err(format!("max risk {} must be a finite, non-negative number", r))
                }
            })
    };

    match (parsed_amount, parsed_risk) {
        (Ok(investment_amount), Ok(risk_tolerance)) => ParsedParameters {
            parameters: Parameters {
                investment_amount,
                risk_tolerance,
            },
            fallback: None,
        },
        (a, r) => {
            let reasons: Vec<String> = [a.err(), r.err()].into_iter().flatten().collect();
            ParsedParameters {
                parameters: defaults.clone(),
                fallback: Some(format!(
                    "Invalid input ({}); using defaults: amount {}, max risk {}",
                    reasons.join("; "),
                    defaults.investment_amount,
                    defaults.risk_tolerance
                )),
            }
        }
    }
}

/// Resolve the run parameters from flags, interactive prompts or defaults.
///
/// A missing flag is prompted for when stdin is a terminal and left at its
/// default otherwise. Any fallback is reported on stderr and in the log.
pub fn resolve_parameters(
    amount_flag: Option<&str>,
    risk_flag: Option<&str>,
    defaults: &Parameters,
    interactive: bool,
) -> Result<ParsedParameters, Box<dyn std::error::Error>> {
    let amount = match amount_flag {
        Some(a) => a.to_string(),
        None if interactive => prompt(&format!(
            "Enter investment amount (default {}): ",
            defaults.investment_amount
        ))?,
        None => String::new(),
    };
    let risk = match risk_flag {
        Some(r) => r.to_string(),
        None if interactive => prompt(&format!(
            "Enter max risk (std dev as decimal, default {}): ",
            defaults.risk_tolerance
        ))?,
        None => String::new(),
    };

    let parsed = parse_parameters(&amount, &risk, defaults);
    if let Some(reason) = &parsed.fallback {
        tracing::warn!(%reason, "parameter fallback");
        eprintln!("{}: {}", "warning".yellow().bold(), reason);
    }
    Ok(parsed)
}

fn prompt(message: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", message)?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn defaults() -> Parameters {
        Parameters {
            investment_amount: dec!(10000),
            risk_tolerance: 0.05,
        }
    }

    #[test]
    fn test_valid_values() {
        let p = parse_parameters("25000.50", "0.12", &defaults());
        assert_eq!(p.fallback, None);
        assert_eq!(p.parameters.investment_amount, dec!(25000.50));
        assert_eq!(p.parameters.risk_tolerance, 0.12);
    }

    #[test]
    fn test_empty_input_uses_default_per_field() {
        let p = parse_parameters("", "0.2", &defaults());
        assert_eq!(p.fallback, None);
        assert_eq!(p.parameters.investment_amount, dec!(10000));
        assert_eq!(p.parameters.risk_tolerance, 0.2);

        let p = parse_parameters("500", "  ", &defaults());
        assert_eq!(p.parameters.investment_amount, dec!(500));
        assert_eq!(p.parameters.risk_tolerance, 0.05);
    }

    #[test]
    fn test_one_bad_value_resets_both() {
        let p = parse_parameters("abc", "0.2", &defaults());
        assert_eq!(p.parameters, defaults());
        assert!(p.fallback.unwrap().contains("abc"));

        let p = parse_parameters("5000", "high", &defaults());
        assert_eq!(p.parameters, defaults());
        assert!(p.fallback.is_some());
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        assert!(parse_parameters("-10", "0.1", &defaults()).fallback.is_some());
        assert!(parse_parameters("0", "0.1", &defaults()).fallback.is_some());
        assert!(parse_parameters("100", "-0.1", &defaults()).fallback.is_some());
        assert!(parse_parameters("100", "inf", &defaults()).fallback.is_some());
        assert!(parse_parameters("100", "NaN", &defaults()).fallback.is_some());
    }

    #[test]
    fn test_scientific_amount() {
        let p = parse_parameters("1e4", "0.1", &defaults());
        assert_eq!(p.fallback, None);
        assert_eq!(p.parameters.investment_amount, dec!(10000));
    }

    #[test]
    fn test_non_interactive_resolution_uses_flags_and_defaults() {
        let p = resolve_parameters(Some("2000"), None, &defaults(), false).unwrap();
        assert_eq!(p.parameters.investment_amount, dec!(2000));
        assert_eq!(p.parameters.risk_tolerance, 0.05);
    }
}
