//! Built-in ClearQuote schema: vehicle cards, detected damages, repairs and quotes.

use super::context::{ColumnDescriptor, ForeignKey, SchemaContext, TableDescriptor};

fn col(name: &str, type_tag: &str, note: Option<&str>) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        type_tag: type_tag.to_string(),
        note: note.map(str::to_string),
    }
}

fn card_fk() -> ForeignKey {
    ForeignKey {
        column: "card_id".to_string(),
        references_table: "vehicle_cards".to_string(),
        references_column: "card_id".to_string(),
    }
}

pub fn clear_quote_schema() -> SchemaContext {
    let tables = vec![
        TableDescriptor {
            name: "vehicle_cards".to_string(),
            columns: vec![
                col("card_id", "INTEGER", Some("PRIMARY KEY")),
                col("vehicle_type", "VARCHAR", Some("e.g. 'car', 'truck', 'van', 'suv'")),
                col("manufacturer", "VARCHAR", Some("e.g. 'Toyota', 'BMW', 'Ford'")),
                col("model", "VARCHAR", Some("e.g. 'Camry', '3 Series'")),
                col("manufacture_year", "INTEGER", Some("4-digit year")),
                col("created_at", "TIMESTAMP", None),
            ],
            foreign_keys: Vec::new(),
        },
        TableDescriptor {
            name: "damage_detections".to_string(),
            columns: vec![
                col("damage_id", "INTEGER", Some("PRIMARY KEY")),
                col("card_id", "INTEGER", None),
                col(
                    "panel_name",
                    "VARCHAR",
                    Some("'front bumper', 'rear bumper', 'left door', 'right door', 'hood', 'trunk', 'front panel', 'rear panel', 'left fender', 'right fender', 'roof', 'windshield'"),
                ),
                col("damage_type", "VARCHAR", Some("e.g. 'scratch', 'dent', 'crack', 'rust', 'paint damage', 'impact'")),
                col("severity", "VARCHAR", Some("'low', 'medium', 'high', 'severe'")),
                col("confidence", "FLOAT", Some("AI confidence 0.0 - 1.0")),
                col("detected_at", "TIMESTAMP", None),
            ],
            foreign_keys: vec![card_fk()],
        },
        TableDescriptor {
            name: "repairs".to_string(),
            columns: vec![
                col("repair_id", "INTEGER", Some("PRIMARY KEY")),
                col("card_id", "INTEGER", None),
                col("panel_name", "VARCHAR", Some("same values as damage_detections.panel_name")),
                col("repair_action", "VARCHAR", Some("e.g. 'repaint', 'replace panel', 'polish', 'weld repair'")),
                col("repair_cost", "NUMERIC(12,2)", None),
                col("approved", "BOOLEAN", None),
                col("created_at", "TIMESTAMP", None),
            ],
            foreign_keys: vec![card_fk()],
        },
        TableDescriptor {
            name: "quotes".to_string(),
            columns: vec![
                col("quote_id", "INTEGER", Some("PRIMARY KEY")),
                col("card_id", "INTEGER", None),
                col("total_estimated_cost", "NUMERIC(12,2)", None),
                col("currency", "VARCHAR", Some("e.g. 'USD', 'EUR', 'INR'")),
                col("generated_at", "TIMESTAMP", None),
            ],
            foreign_keys: vec![card_fk()],
        },
    ];

    let notes = vec![
        "panel_name, severity and damage_type may differ in casing; filter with ILIKE or LOWER().".to_string(),
        "Informal phrases: 'front side' -> 'front panel' or 'front bumper'; 'back bumper' -> 'rear bumper'; 'back side' -> 'rear panel' or 'rear bumper'; 'left side' -> 'left door' or 'left fender'; 'right side' -> 'right door' or 'right fender'.".to_string(),
        "Use CURRENT_DATE for today and CURRENT_TIMESTAMP for now. 'This month' -> date_column >= DATE_TRUNC('month', CURRENT_DATE). 'Last 30 days' -> date_column >= CURRENT_DATE - INTERVAL '30 days'.".to_string(),
        "When a question mentions damages AND a repair column, join repairs r to damage_detections dd ON dd.card_id = r.card_id AND LOWER(dd.panel_name) = LOWER(r.panel_name).".to_string(),
        "AVG/SUM/MIN/MAX return NULL over zero rows. Whenever you aggregate, also select a COUNT of the aggregated rows (e.g. matching_repairs).".to_string(),
        "Never invent tables or columns that are not listed above.".to_string(),
    ];

    SchemaContext::new("clearquote", tables, Vec::new(), notes)
}
