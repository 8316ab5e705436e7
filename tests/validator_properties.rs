use clearquote::reason::ReasonCode;
use clearquote::schema::SchemaContext;
use clearquote::validator::keywords::{DENIED_FUNCTIONS, WRITE_KEYWORDS};
use clearquote::validator::{SqlValidator, ValidationVerdict};
use proptest::prelude::*;

const WRITES: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "COPY", "MERGE",
];

const ACCEPTED: &[&str] = &[
    "SELECT COUNT(*) AS total_quotes FROM quotes",
    "SELECT v.manufacturer , COUNT(*) AS repairs FROM repairs r JOIN vehicle_cards v ON v.card_id = r.card_id GROUP BY v.manufacturer",
    "SELECT AVG(r.repair_cost) AS avg_cost , COUNT(*) AS matching_repairs FROM repairs r JOIN damage_detections dd ON dd.card_id = r.card_id WHERE dd.panel_name ILIKE '%bumper%'",
    "WITH recent AS ( SELECT * FROM quotes WHERE generated_at >= DATE_TRUNC('month', CURRENT_DATE) ) SELECT currency , SUM(total_estimated_cost) FROM recent GROUP BY currency",
    "SELECT EXTRACT(YEAR FROM created_at) AS y , COUNT(*) FROM vehicle_cards GROUP BY 1 ORDER BY 1",
];

fn cased(word: &str, mask: &[bool]) -> String {
    word.chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
        .collect()
}

fn reason(sql: &str) -> Option<ReasonCode> {
    SqlValidator::new()
        .validate(sql, &SchemaContext::describe())
        .reason()
}

proptest! {
    #[test]
    fn test_leading_write_keyword_any_case(
        idx in 0..WRITES.len(),
        mask in prop::collection::vec(any::<bool>(), 1..8),
        note in "[a-z ]{0,12}",
    ) {
        let keyword = cased(WRITES[idx], &mask);
        let sql = format!("/* {} */ {} /**/ repairs", note, keyword);
        prop_assert_eq!(reason(&sql), Some(ReasonCode::WriteOperation));
    }

    #[test]
    fn test_write_keyword_inside_cte_any_case(
        idx in 0..WRITES.len(),
        mask in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        let keyword = cased(WRITES[idx], &mask);
        let sql = format!("WITH x AS ({}--\n repairs) SELECT * FROM x", keyword);
        prop_assert_eq!(reason(&sql), Some(ReasonCode::WriteOperation));
    }

    #[test]
    fn test_unknown_tables_rejected(name in "[a-z]{3,12}") {
        let schema = SchemaContext::describe();
        prop_assume!(!schema.contains(&name));
        prop_assume!(!WRITE_KEYWORDS.contains(name.to_ascii_uppercase().as_str()));
        prop_assume!(!DENIED_FUNCTIONS.contains(name.as_str()));
        prop_assume!(name != "only" && name != "lateral");

        let sql = format!("SELECT * FROM {}", name);
        prop_assert_eq!(reason(&sql), Some(ReasonCode::UnknownTable));
    }

    #[test]
    fn test_validation_is_deterministic(sql in "\\PC{0,80}") {
        let schema = SchemaContext::describe();
        let validator = SqlValidator::new();
        prop_assert_eq!(validator.validate(&sql, &schema), validator.validate(&sql, &schema));
    }

    #[test]
    fn test_normalized_form_is_a_fixed_point(
        idx in 0..ACCEPTED.len(),
        gaps in prop::collection::vec(prop::sample::select(vec![" ", "  ", "\n", "\t", " /* note */ ", " -- note\n"]), 64),
        trailing in prop::sample::select(vec!["", ";", " ; ;"]),
    ) {
        let words: Vec<&str> = ACCEPTED[idx].split(' ').collect();
        let mut sql = String::new();
        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                sql.push_str(gaps[i % gaps.len()]);
            }
            sql.push_str(word);
        }
        sql.push_str(trailing);

        let schema = SchemaContext::describe();
        let validator = SqlValidator::new();
        let first = match validator.validate(&sql, &schema) {
            ValidationVerdict::Accepted(statement) => statement,
            ValidationVerdict::Rejected(rejection) => {
                return Err(TestCaseError::fail(format!("rejected {:?}: {}", rejection, sql)));
            }
        };
        let second = validator.validate(first.normalized(), &schema);
        prop_assert_eq!(second.accepted(), Some(&first));
    }

    #[test]
    fn test_stray_paren_is_never_accepted(
        idx in 0..ACCEPTED.len(),
        at in 1usize..64,
        stray in prop::sample::select(vec![")", "(", "))", ") AS r0, pg_roles AS p"]),
    ) {
        let words: Vec<&str> = ACCEPTED[idx].split(' ').collect();
        let at = 1 + at % (words.len() - 1);
        let mut spliced = words.clone();
        spliced.insert(at, stray);
        let sql = spliced.join(" ");

        prop_assert_eq!(reason(&sql), Some(ReasonCode::EmptyOrUnparseable), "{}", sql);
    }
}

#[test]
fn test_smuggled_second_statement_is_multi_statement() {
    assert_eq!(
        reason("SELECT * FROM vehicle_cards /* */; DROP TABLE quotes;"),
        Some(ReasonCode::MultiStatement)
    );
}

#[test]
fn test_schema_qualified_table() {
    assert_eq!(
        reason("SELECT * FROM public.vehicle_cards"),
        Some(ReasonCode::SchemaQualifiedName)
    );
}
