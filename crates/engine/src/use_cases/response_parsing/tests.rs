//! Recovery-chain tests for the response parser.
//!
//! Tests cover:
//! - Each strategy being selected for the input shape it exists for
//! - Truncation at every byte offset never leaking protocol syntax
//! - Plain-text passthrough when JSON was not requested
//! - Hard caps on size and nesting

use serde_json::json;

use super::*;

const FULL_RESPONSE: &str = r#"{"narrative": "You enter the hall. \"Halt!\" cries a guard.\nTorches flicker.", "entities_mentioned": ["Aria", "Captain Thorne"], "location_confirmed": "Great Hall", "planning_block": "1. Talk\n2. Fight", "state_updates": {"player": {"hp": 10, "gold": 25}}, "debug_info": {"dm_notes": ["guard is nervous"], "roll": 14}}"#;

fn parse_json(text: &str) -> StructuredResponse {
    parse_structured_response(text, true)
}

// =============================================================================
// Strategy selection
// =============================================================================

#[test]
fn test_strict_json_copies_fields_verbatim() {
    let source = json!({
        "narrative": "The bridge sways.",
        "entities_mentioned": ["Aria"],
        "location_confirmed": "Rope Bridge",
        "planning_block": "Cross or turn back?",
        "state_updates": {"party": {"morale": "shaken", "torches": 2}},
        "debug_info": {"dc": 12, "rolls": [3, 17]}
    });

    let response = parse_json(&source.to_string());

    assert_eq!(response.parse_method_used, ParseMethod::StrictJson);
    assert_eq!(response.narrative, "The bridge sways.");
    assert_eq!(response.entities_mentioned, vec!["Aria".to_string()]);
    assert_eq!(response.location_confirmed.as_deref(), Some("Rope Bridge"));
    assert_eq!(response.planning_block.as_deref(), Some("Cross or turn back?"));
    assert_eq!(
        response.state_updates.map(Value::Object),
        Some(source["state_updates"].clone())
    );
    assert_eq!(
        response.debug_info.map(Value::Object),
        Some(source["debug_info"].clone())
    );
    assert!(response.warnings.is_empty());
}

#[test]
fn test_literal_braces_in_narrative_survive_strict_parse() {
    let response = parse_json(r#"{"narrative": "The sign reads: {Beware}", "debug_info": {}}"#);

    assert_eq!(response.parse_method_used, ParseMethod::StrictJson);
    assert_eq!(response.narrative, "The sign reads: {Beware}");
    assert_eq!(response.debug_info, Some(Map::new()));
}

#[test]
fn test_boundary_extraction_skips_preamble_and_fences() {
    let raw = "Sure! Here is the next turn:\n```json\n{\"narrative\": \"Rain hammers the roof {softly}.\", \"planning_block\": \"Wait it out?\"}\n```\nLet me know!";
    let response = parse_json(raw);

    assert_eq!(response.parse_method_used, ParseMethod::BoundaryExtraction);
    assert_eq!(response.narrative, "Rain hammers the roof {softly}.");
    assert_eq!(response.planning_block.as_deref(), Some("Wait it out?"));
}

#[test]
fn test_truncated_mid_string_is_completed() {
    let response = parse_json(r#"{"narrative": "You enter the hall."#);

    assert!(matches!(
        response.parse_method_used,
        ParseMethod::TruncationCompletion | ParseMethod::RegexExtraction
    ));
    assert!(response.narrative.starts_with("You enter the hall."));
    assert!(!response.has_protocol_leak());
}

#[test]
fn test_truncated_inside_fenced_block_is_completed() {
    let raw = "```json\n{\"narrative\": \"The ogre roars.\", \"state_updates\": {\"ogre\": {\"hp\": 4";
    let response = parse_json(raw);

    assert_eq!(response.parse_method_used, ParseMethod::TruncationCompletion);
    assert_eq!(response.narrative, "The ogre roars.");
    assert_eq!(
        response.state_updates.map(Value::Object),
        Some(json!({"ogre": {"hp": 4}}))
    );
}

#[test]
fn test_regex_extraction_recovers_from_broken_syntax() {
    let raw = r#"Output: {"narrative": "The door creaks open.\nCold air spills out.", oops, "entities_mentioned": ["Aria"]}"#;
    let response = parse_json(raw);

    assert_eq!(response.parse_method_used, ParseMethod::RegexExtraction);
    assert_eq!(response.narrative, "The door creaks open.\nCold air spills out.");
    assert_eq!(response.entities_mentioned, vec!["Aria".to_string()]);
}

#[test]
fn test_json_mode_prose_with_braces_falls_back_to_raw_text() {
    let raw = "The wizard scrawls {ancient runes} across the door.";
    let response = parse_json(raw);

    assert_eq!(response.parse_method_used, ParseMethod::PlainTextFallback);
    assert_eq!(response.narrative, raw);
    assert_eq!(response.warnings.len(), 1);
}

#[test]
fn test_json_mode_without_any_object_uses_raw_text() {
    let raw = "The model ignored the format and just told a story.";
    let response = parse_json(raw);

    assert_eq!(response.parse_method_used, ParseMethod::PlainTextFallback);
    assert_eq!(response.narrative, raw);
    assert!(response.warnings[0].contains("expected JSON"));
}

#[test]
fn test_empty_narrative_fails_sanity_check() {
    let raw = r#"{"narrative": "  ", "planning_block": "Choose."}"#;
    let response = parse_json(raw);

    assert_eq!(response.parse_method_used, ParseMethod::PlainTextFallback);
    assert_eq!(response.narrative, raw);
}

#[test]
fn test_minimum_narrative_length_is_configurable() {
    let parser = ResponseParser::new(ParserLimits {
        min_narrative_chars: 10,
        ..ParserLimits::default()
    });
    let response = parser.parse(r#"{"narrative": "Ok."}"#, true);
    assert_eq!(response.parse_method_used, ParseMethod::PlainTextFallback);

    let response = parser.parse(r#"{"narrative": "Long enough now."}"#, true);
    assert_eq!(response.parse_method_used, ParseMethod::StrictJson);
}

#[test]
fn test_encoded_looking_narrative_is_kept_verbatim() {
    let source = json!({
        "narrative": "{\"narrative\": \"Inner story.\", \"planning_block\": \"x\"}"
    });
    let response = parse_json(&source.to_string());

    assert_eq!(response.parse_method_used, ParseMethod::StrictJson);
    assert_eq!(Value::String(response.narrative.clone()), source["narrative"]);
    assert!(response.warnings.is_empty());
}

#[test]
fn test_double_encoded_narrative_is_unwrapped_during_field_recovery() {
    let raw = r#"{oops, "narrative": "{\"narrative\": \"Inner story.\"}"}"#;
    let response = parse_json(raw);

    assert_eq!(response.parse_method_used, ParseMethod::RegexExtraction);
    assert_eq!(response.narrative, "Inner story.");
    assert!(!response.has_protocol_leak());
    assert!(response.warnings.iter().any(|w| w.contains("nested")));
}

#[test]
fn test_debug_narrative_never_becomes_player_narrative() {
    let raw = r#"{"debug_info": {"narrative": "DM SECRET: the innkeeper is the killer"}, oops "narrative": "The innkeeper smiles."}"#;
    let response = parse_json(raw);

    assert_eq!(response.parse_method_used, ParseMethod::RegexExtraction);
    assert_eq!(response.narrative, "The innkeeper smiles.");
    assert!(!response.narrative.contains("SECRET"));
}

#[test]
fn test_wrong_field_types_are_ignored_with_warnings() {
    let raw = r#"{"narrative": "Fine.", "planning_block": {"a": 1}, "state_updates": "none", "entities_mentioned": ["Aria", 3, null]}"#;
    let response = parse_json(raw);

    assert_eq!(response.parse_method_used, ParseMethod::StrictJson);
    assert!(response.planning_block.is_none());
    assert!(response.state_updates.is_none());
    assert_eq!(response.entities_mentioned, vec!["Aria".to_string()]);
    assert_eq!(response.warnings.len(), 3);
}

// =============================================================================
// Truncation robustness
// =============================================================================

#[test]
fn test_every_truncation_point_yields_clean_narrative() {
    let first_content = FULL_RESPONSE.find("You").unwrap();

    for cut in (first_content + 1)..=FULL_RESPONSE.len() {
        if !FULL_RESPONSE.is_char_boundary(cut) {
            continue;
        }
        let prefix = &FULL_RESPONSE[..cut];
        let response = parse_json(prefix);

        assert!(
            !response.narrative.trim().is_empty(),
            "empty narrative for cut at {}: {:?}",
            cut,
            prefix
        );
        assert!(
            !response.has_protocol_leak(),
            "protocol leak for cut at {}: {:?}",
            cut,
            response.narrative
        );
        assert!(
            response.parse_method_used.is_structured(),
            "fell back to raw text for cut at {}",
            cut
        );
        assert!(response.narrative.starts_with('Y'));
    }
}

#[test]
fn test_full_response_round_trip() {
    let response = parse_json(FULL_RESPONSE);
    let source: Value = serde_json::from_str(FULL_RESPONSE).unwrap();

    assert_eq!(response.parse_method_used, ParseMethod::StrictJson);
    assert_eq!(Value::String(response.narrative.clone()), source["narrative"]);
    assert_eq!(
        response.state_updates.map(Value::Object),
        Some(source["state_updates"].clone())
    );
}

// =============================================================================
// Plain-text mode
// =============================================================================

#[test]
fn test_plain_text_mode_passes_text_through_verbatim() {
    let raw = "  The sign reads {Beware} and \"narrative\": nothing more.  ";
    let response = parse_structured_response(raw, false);

    assert_eq!(response, StructuredResponse::plain_text(raw));
    assert_eq!(response.parse_method_used, ParseMethod::PlainTextFallback);
}

#[test]
fn test_plain_text_mode_never_decodes_json() {
    let raw = r#"{"narrative": "Looks like JSON"}"#;
    let response = parse_structured_response(raw, false);

    assert_eq!(response.narrative, raw);
    assert_eq!(response.parse_method_used, ParseMethod::PlainTextFallback);
}

// =============================================================================
// Hard caps and hostile input
// =============================================================================

#[test]
fn test_empty_input_returns_empty_narrative_with_warning() {
    let response = parse_json("");

    assert!(response.narrative.is_empty());
    assert_eq!(response.parse_method_used, ParseMethod::PlainTextFallback);
    assert!(response.warnings[0].contains("empty"));
}

#[test]
fn test_oversized_input_is_truncated_on_char_boundary() {
    let parser = ResponseParser::new(ParserLimits {
        max_input_bytes: 33,
        ..ParserLimits::default()
    });
    let raw = "é".repeat(40);
    let response = parser.parse(&raw, false);

    assert_eq!(response.narrative, "é".repeat(16));
    assert!(response.warnings[0].contains("input truncated before parse"));
}

#[test]
fn test_oversized_json_still_recovers_narrative() {
    let parser = ResponseParser::new(ParserLimits {
        max_input_bytes: 64,
        ..ParserLimits::default()
    });
    let raw = format!(r#"{{"narrative": "{}"}}"#, "a".repeat(500));
    let response = parser.parse(&raw, true);

    assert_eq!(response.parse_method_used, ParseMethod::TruncationCompletion);
    assert_eq!(response.narrative, "a".repeat(64 - r#"{"narrative": ""#.len()));
    assert!(response.warnings[0].contains("exceeds limit"));
}

#[test]
fn test_deep_nesting_is_capped_before_decoding() {
    let raw = format!(
        r#"{{"narrative": "Deep.", "debug_info": {}{}}}"#,
        "[".repeat(5_000),
        "]".repeat(5_000)
    );
    let response = parse_json(&raw);

    assert_eq!(response.parse_method_used, ParseMethod::TruncationCompletion);
    assert_eq!(response.narrative, "Deep.");
    assert!(response.warnings[0].contains("nesting"));
}

#[test]
fn test_brace_flood_does_not_panic() {
    let raw = "{".repeat(100_000);
    let response = parse_json(&raw);

    assert_eq!(response.parse_method_used, ParseMethod::PlainTextFallback);
    assert_eq!(response.narrative.len(), DEFAULT_MAX_NESTING_DEPTH);
}

#[test]
fn test_garbage_input_never_panics() {
    let samples = [
        "\u{0}\u{1}{\"\\",
        "{\"narrative\":",
        "{\"narrative\": \"\\u",
        "}}}}{{{{\"\"\"::,,]]",
        "{\"narrative\" \"missing colon\"}",
        "\u{FFFD}{\u{FFFD}\"narrative\": \"\u{FFFD}ok",
    ];

    for raw in samples {
        let json_mode = parse_json(raw);
        let prose_mode = parse_structured_response(raw, false);
        assert_eq!(prose_mode.narrative, raw);
        assert!(!json_mode.narrative.is_empty() || raw.trim().is_empty());
    }
}

#[test]
fn test_parser_is_shareable_across_threads() {
    let parser = ResponseParser::default();
    let expected = parser.parse(FULL_RESPONSE, true);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| parser.parse(FULL_RESPONSE, true)))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
