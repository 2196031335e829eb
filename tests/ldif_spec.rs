use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ldif_reader::{
    ChangeRecord, Dn, Entry, ImportConfig, ImportPlugin, LdifError, LdifReader, ModificationType,
    PluginVerdict, Rdn, Schema, SyntaxPolicy,
};

/// A writer handle whose contents stay observable after the config takes
/// ownership of the sink.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn new() -> Self {
        SharedBuf::default()
    }

    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).expect("side channel is UTF-8")
    }

    fn blocks(&self) -> usize {
        self.contents().lines().filter(|l| l.starts_with("# ")).count()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn config_for(ldif: &str) -> ImportConfig {
    ImportConfig::new().add_source(Cursor::new(ldif.as_bytes().to_vec()))
}

fn reader_for(ldif: &str) -> LdifReader {
    LdifReader::new(config_for(ldif), Arc::new(Schema::core()))
}

fn reader_with(config: ImportConfig) -> LdifReader {
    LdifReader::new(config, Arc::new(Schema::core()))
}

/// Reads entries to end of input, collecting successes and parse errors.
fn drain_entries(reader: &mut LdifReader) -> (Vec<Entry>, Vec<LdifError>) {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    loop {
        match reader.read_entry() {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => break,
            Err(e) => {
                let fatal = !e.can_continue();
                errors.push(e);
                if fatal {
                    break;
                }
            }
        }
    }
    (entries, errors)
}

fn attr_value<'a>(entry: &'a Entry, name: &str) -> &'a [u8] {
    entry
        .attribute(name)
        .unwrap_or_else(|| panic!("missing attribute {name} on {}", entry.dn()))
        .first_value()
        .unwrap_or_else(|| panic!("attribute {name} has no values"))
}

#[test]
fn reads_single_entry_with_counters() {
    let mut reader = reader_for("dn: dc=x\nobjectClass: top\ncn: a\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assert_eq!(entries.len(), 1);

    let entry = &entries[0];
    assert_eq!(entry.dn(), &Dn::parse("dc=x").unwrap());
    assert!(entry.has_object_class("top"));
    assert_eq!(attr_value(entry, "cn"), b"a");

    assert_eq!(reader.entries_read(), 1);
    assert_eq!(reader.entries_ignored(), 0);
    assert_eq!(reader.entries_rejected(), 0);
}

#[test]
fn every_rdn_value_is_present_on_emitted_entries() {
    let mut reader =
        reader_for("dn: dc=x\nobjectClass: top\ncn: a\n\ndn: cn=b+sn=c,dc=x\nobjectClass: top\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    for entry in &entries {
        for ava in entry.dn().rdn().unwrap().avas() {
            let attr = entry
                .attribute(ava.attribute_name())
                .unwrap_or_else(|| panic!("RDN attribute {} missing", ava.attribute_name()));
            assert!(
                attr.contains(ava.value()),
                "RDN value of {} missing on {}",
                ava.attribute_name(),
                entry.dn()
            );
        }
    }
}

#[test]
fn version_directive_is_transparent() {
    let with_standalone = "version: 1\n\ndn: dc=x\nobjectClass: top\n\n";
    let with_inline = "version: 1\ndn: dc=x\nobjectClass: top\n\n";
    let without = "dn: dc=x\nobjectClass: top\n\n";

    for ldif in [with_standalone, with_inline, without] {
        let mut reader = reader_for(ldif);
        let (entries, errors) = drain_entries(&mut reader);
        assert!(errors.is_empty(), "errors for {ldif:?}: {errors:?}");
        assert_eq!(entries.len(), 1, "wrong entry count for {ldif:?}");
        assert_eq!(entries[0].dn(), &Dn::parse("dc=x").unwrap());
        // The version-only record is not counted.
        assert_eq!(reader.entries_read(), 1, "wrong read count for {ldif:?}");
    }
}

#[test]
fn base64_values_round_trip() {
    let mut reader = reader_for("dn: dc=x\ncn:: SGVsbG8=\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(attr_value(&entries[0], "cn"), b"Hello");

    // Arbitrary bytes survive the encode/decode pair unchanged.
    let payload: Vec<u8> = (0u8..=255).collect();
    let ldif = format!("dn: dc=x\nuserPassword:: {}\n\n", STANDARD.encode(&payload));
    let mut reader = reader_for(&ldif);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(attr_value(&entries[0], "userPassword"), payload.as_slice());
}

#[test]
fn bad_base64_rejects_the_record() {
    let reject = SharedBuf::new();
    let config = config_for("dn: dc=x\ncn:: @@@not-base64@@@\n\n")
        .with_reject_writer(reject.clone());
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(entries.is_empty());
    assert_eq!(errors.len(), 1);
    assert_eq!(reader.entries_rejected(), 1);
    assert_eq!(reject.blocks(), 1);
}

#[test]
fn missing_dn_line_is_rejected_with_line_number() {
    let reject = SharedBuf::new();
    let config = config_for("cn: wrong\n\n").with_reject_writer(reject.clone());
    let mut reader = reader_with(config);

    let (entries, errors) = drain_entries(&mut reader);
    assert!(entries.is_empty());
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line(), Some(1));
    assert!(errors[0].can_continue());

    assert_eq!(reader.entries_read(), 1);
    assert_eq!(reader.entries_rejected(), 1);

    let contents = reject.contents();
    assert!(contents.starts_with("# "), "missing reason comment: {contents:?}");
    assert!(contents.contains("cn: wrong\n"), "missing record replay: {contents:?}");
    assert!(contents.ends_with("\n\n"), "missing blank separator: {contents:?}");
}

#[test]
fn bom_is_transparent() {
    let plain = "dn: dc=x\nobjectClass: top\ncn: a\n\n";
    let with_bom = format!("\u{feff}{plain}");

    let mut reader = reader_for(plain);
    let (plain_entries, _) = drain_entries(&mut reader);
    let mut reader = reader_for(&with_bom);
    let (bom_entries, errors) = drain_entries(&mut reader);

    assert!(errors.is_empty());
    assert_eq!(plain_entries.len(), bom_entries.len());
    assert_eq!(plain_entries[0].dn(), bom_entries[0].dn());
    assert_eq!(attr_value(&bom_entries[0], "cn"), b"a");
}

#[test]
fn continuation_folding_is_equivalent_to_one_line() {
    let value = "abcdefghijklmnopqrstuvwxyz0123456789";
    for pieces in [0usize, 1, 2, 7] {
        let mut ldif = String::from("dn: dc=x\n");
        if pieces == 0 {
            ldif.push_str(&format!("cn: {value}\n"));
        } else {
            let chunk = value.len().div_ceil(pieces + 1);
            let mut chunks = value.as_bytes().chunks(chunk);
            let first = std::str::from_utf8(chunks.next().unwrap()).unwrap();
            ldif.push_str(&format!("cn: {first}\n"));
            for rest in chunks {
                ldif.push_str(&format!(" {}\n", std::str::from_utf8(rest).unwrap()));
            }
        }
        ldif.push('\n');

        let mut reader = reader_for(&ldif);
        let (entries, errors) = drain_entries(&mut reader);
        assert!(errors.is_empty(), "errors folding into {pieces} pieces: {errors:?}");
        assert_eq!(
            attr_value(&entries[0], "cn"),
            value.as_bytes(),
            "value mismatch when folded into {pieces} pieces"
        );
    }
}

#[test]
fn tab_continuation_is_tolerated() {
    let mut reader = reader_for("dn: dc=x\ncn: ab\n\tcd\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(attr_value(&entries[0], "cn"), b"abcd");
}

#[test]
fn continuation_without_predecessor_is_fatal() {
    let reject = SharedBuf::new();
    let config = config_for(" floating continuation\n").with_reject_writer(reject.clone());
    let mut reader = reader_with(config);
    let err = reader.read_entry().unwrap_err();
    assert!(!err.can_continue());
    assert_eq!(reader.entries_rejected(), 1);
    assert_eq!(reject.blocks(), 1);
}

#[test]
fn comments_are_discarded() {
    let ldif = "# header comment\ndn: dc=x\n# interleaved\nobjectClass: top\ncn: a\n\n";
    let mut reader = reader_for(ldif);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(entries.len(), 1);
    assert_eq!(attr_value(&entries[0], "cn"), b"a");
}

#[test]
fn counters_balance_after_end_of_input() {
    let skip = SharedBuf::new();
    let reject = SharedBuf::new();
    let ldif = "dn: dc=one,dc=root\nobjectClass: top\n\n\
                dn: cn=x,ou=skip,dc=root\nobjectClass: top\n\n\
                dn: dc=bad,dc=root\ncn: a\ncn: a\n\n\
                dn: dc=two,dc=root\nobjectClass: top\n\n";
    let config = config_for(ldif)
        .exclude_branch(Dn::parse("ou=skip,dc=root").unwrap())
        .with_skip_writer(skip.clone())
        .with_reject_writer(reject.clone());
    let mut reader = reader_with(config);

    let (entries, errors) = drain_entries(&mut reader);
    assert_eq!(entries.len(), 2);
    assert_eq!(errors.len(), 1);

    let emitted = entries.len() as u64;
    assert_eq!(reader.entries_read(), emitted + reader.entries_ignored() + reader.entries_rejected());
    assert_eq!(reader.entries_read(), 4);
    assert_eq!(reader.entries_ignored(), 1);
    assert_eq!(reader.entries_rejected(), 1);
    assert_eq!(skip.blocks(), 1);
    assert_eq!(reject.blocks(), 1);
}

#[test]
fn emitted_order_matches_source_order() {
    let ldif = "dn: dc=a\nobjectClass: top\n\n\
                dn: dc=b\nobjectClass: top\n\n\
                dn: dc=c\nobjectClass: top\n\n";
    let mut reader = reader_for(ldif);
    let dns: Vec<String> = reader
        .entries()
        .map(|r| r.expect("entry ok").dn().to_string())
        .collect();
    assert_eq!(dns, ["dc=a", "dc=b", "dc=c"]);
}

#[test]
fn multiple_sources_are_concatenated() {
    let config = ImportConfig::new()
        .add_source(Cursor::new(b"dn: dc=first\nobjectClass: top\n\n".to_vec()))
        .add_source(Cursor::new(b"dn: dc=second\nobjectClass: top\n\n".to_vec()));
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    let dns: Vec<String> = entries.iter().map(|e| e.dn().to_string()).collect();
    assert_eq!(dns, ["dc=first", "dc=second"]);
}

#[test]
fn url_values_are_fetched_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.bin");
    let payload = b"\x89binary payload\x00";
    std::fs::write(&path, payload).unwrap();

    let ldif = format!("dn: dc=x\nuserPassword:< file://{}\n\n", path.display());
    let mut reader = reader_for(&ldif);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(attr_value(&entries[0], "userPassword"), payload.as_slice());
}

#[test]
fn disallowed_url_scheme_rejects_the_record() {
    let mut reader = reader_for("dn: dc=x\ncn:< http://example.com/x\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(entries.is_empty());
    assert_eq!(errors.len(), 1);
    assert_eq!(reader.entries_rejected(), 1);
}

#[test]
fn skip_channel_replays_excluded_records() {
    let skip = SharedBuf::new();
    let config = config_for("dn: ou=private,dc=x\nobjectClass: organizationalUnit\nou: private\n\n")
        .exclude_branch(Dn::parse("ou=private,dc=x").unwrap())
        .with_skip_writer(skip.clone());
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(entries.is_empty());
    assert!(errors.is_empty());
    assert_eq!(reader.entries_ignored(), 1);

    let contents = skip.contents();
    assert!(contents.starts_with("# "));
    assert!(contents.contains("dn: ou=private,dc=x\n"));
    assert!(contents.contains("ou: private\n"));
}

#[test]
fn entry_filters_run_on_the_assembled_entry() {
    let ldif = "dn: cn=printer,dc=x\nobjectClass: device\ncn: printer\n\n\
                dn: dc=keep\nobjectClass: top\n\n";
    let config = config_for(ldif).add_entry_filter(|entry| !entry.has_object_class("device"));
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].dn(), &Dn::parse("dc=keep").unwrap());
    assert_eq!(reader.entries_ignored(), 1);
}

#[test]
fn attribute_excludes_drop_lines() {
    let config = config_for("dn: dc=x\ncn: keep\nuserPassword: hunter2\n\n")
        .exclude_attribute("userPassword");
    let mut reader = reader_with(config);
    let (entries, _) = drain_entries(&mut reader);
    assert!(entries[0].attribute("userPassword").is_none());
    assert_eq!(attr_value(&entries[0], "cn"), b"keep");
}

#[test]
fn duplicate_values_fatal_only_under_schema_check() {
    let mut reader = reader_for("dn: dc=x\ncn: a\ncn: a\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(entries.is_empty());
    assert_eq!(errors.len(), 1);

    let config = config_for("dn: dc=x\ncn: a\ncn: a\n\n").with_schema_validation(false);
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(entries[0].attribute("cn").unwrap().len(), 1, "duplicate silently dropped");
}

#[test]
fn single_valued_attributes_are_enforced() {
    let mut reader = reader_for("dn: dc=x\ndc: one\ndc: two\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(entries.is_empty());
    assert_eq!(errors.len(), 1);
    assert_eq!(reader.entries_rejected(), 1);
}

#[test]
fn binary_option_requires_binary_syntax() {
    let mut reader = reader_for("dn: dc=x\ncn;binary: nope\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(entries.is_empty());
    assert_eq!(errors.len(), 1);

    let mut reader = reader_for("dn: dc=x\nuserCertificate;binary:: AAECAw==\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(entries.len(), 1);
}

#[test]
fn syntax_policy_governs_violations() {
    let bad_integer = "dn: dc=x\nuidNumber: not-a-number\n\n";

    let config = config_for(bad_integer).with_syntax_policy(SyntaxPolicy::Reject);
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(entries.is_empty());
    assert_eq!(errors.len(), 1);

    let config = config_for(bad_integer).with_syntax_policy(SyntaxPolicy::Warn);
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(entries.len(), 1);

    let config = config_for(bad_integer);
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty(), "accept policy must not validate");
    assert_eq!(entries.len(), 1);
}

#[test]
fn modify_change_record_preserves_modification_order() {
    let ldif = "dn: dc=x\nchangetype: modify\nreplace: cn\ncn: new\n-\nadd: sn\nsn: s1\nsn: s2\n-\n\n";
    let mut reader = reader_for(ldif);
    let change = reader.read_change_record(false).unwrap().expect("one change");

    let ChangeRecord::Modify { dn, modifications } = change else {
        panic!("expected a modify change record");
    };
    assert_eq!(dn, Dn::parse("dc=x").unwrap());
    assert_eq!(modifications.len(), 2);

    assert_eq!(modifications[0].modification_type(), ModificationType::Replace);
    assert_eq!(modifications[0].attribute().name(), "cn");
    assert_eq!(modifications[0].attribute().values(), [b"new".to_vec()]);

    assert_eq!(modifications[1].modification_type(), ModificationType::Add);
    assert_eq!(modifications[1].attribute().name(), "sn");
    assert_eq!(
        modifications[1].attribute().values(),
        [b"s1".to_vec(), b"s2".to_vec()]
    );
}

#[test]
fn modify_dn_change_record() {
    let ldif = "dn: dc=x\nchangetype: moddn\nnewrdn: dc=y\ndeleteoldrdn: 1\nnewsuperior: dc=root\n\n";
    let mut reader = reader_for(ldif);
    let change = reader.read_change_record(false).unwrap().expect("one change");

    let ChangeRecord::ModifyDn { dn, new_rdn, delete_old_rdn, new_superior } = change else {
        panic!("expected a modify DN change record");
    };
    assert_eq!(dn, Dn::parse("dc=x").unwrap());
    assert_eq!(new_rdn, Rdn::parse("dc=y").unwrap());
    assert!(delete_old_rdn);
    assert_eq!(new_superior, Some(Dn::parse("dc=root").unwrap()));
}

#[test]
fn modify_dn_boolean_forms() {
    for (token, expected) in
        [("0", false), ("1", true), ("false", false), ("TRUE", true), ("No", false), ("yes", true)]
    {
        let ldif = format!("dn: dc=x\nchangetype: modrdn\nnewrdn: dc=y\ndeleteoldrdn: {token}\n\n");
        let mut reader = reader_for(&ldif);
        let change = reader.read_change_record(false).unwrap().expect("one change");
        let ChangeRecord::ModifyDn { delete_old_rdn, new_superior, .. } = change else {
            panic!("expected a modify DN change record");
        };
        assert_eq!(delete_old_rdn, expected, "token {token:?}");
        assert_eq!(new_superior, None);
    }

    let ldif = "dn: dc=x\nchangetype: moddn\nnewrdn: dc=y\ndeleteoldrdn: maybe\n\n";
    let mut reader = reader_for(ldif);
    assert!(reader.read_change_record(false).is_err());
}

#[test]
fn modify_dn_missing_parts_are_fatal() {
    let mut reader = reader_for("dn: dc=x\nchangetype: moddn\n\n");
    assert!(reader.read_change_record(false).is_err());

    let mut reader = reader_for("dn: dc=x\nchangetype: moddn\nnewrdn: dc=y\n\n");
    assert!(reader.read_change_record(false).is_err());
}

#[test]
fn delete_change_record_must_be_bare() {
    let mut reader = reader_for("dn: dc=x\nchangetype: delete\n\n");
    let change = reader.read_change_record(false).unwrap().expect("one change");
    assert!(matches!(change, ChangeRecord::Delete(dn) if dn == Dn::parse("dc=x").unwrap()));

    let mut reader = reader_for("dn: dc=x\nchangetype: delete\ncn: stray\n\n");
    let err = reader.read_change_record(false).unwrap_err();
    assert!(err.can_continue());
    assert_eq!(reader.entries_rejected(), 1);
}

#[test]
fn add_change_record_reconstructs_object_classes() {
    let ldif = "dn: dc=x\nchangetype: add\nobjectClass: top\nobjectClass: domain\ndc: x\n\n";
    let mut reader = reader_for(ldif);
    let change = reader.read_change_record(false).unwrap().expect("one change");

    let ChangeRecord::Add(entry) = change else {
        panic!("expected an add change record");
    };
    assert!(entry.has_object_class("top"));
    assert!(entry.has_object_class("domain"));
    let oc_attr = entry.attribute("objectClass").expect("reconstructed objectClass attribute");
    assert_eq!(oc_attr.values(), [b"top".to_vec(), b"domain".to_vec()]);
    assert_eq!(attr_value(&entry, "dc"), b"x");
}

#[test]
fn add_change_record_without_object_classes_still_gets_the_attribute() {
    let mut reader = reader_for("dn: dc=x\nchangetype: add\ncn: a\n\n");
    let change = reader.read_change_record(false).unwrap().expect("one change");

    let ChangeRecord::Add(entry) = change else {
        panic!("expected an add change record");
    };
    let oc_attr = entry.attribute("objectClass").expect("reconstructed objectClass attribute");
    assert!(oc_attr.is_empty(), "no object classes were declared");
    assert_eq!(attr_value(&entry, "cn"), b"a");
}

#[test]
fn counters_balance_for_change_record_sources() {
    let ldif = "dn: dc=a\nchangetype: delete\n\n\
                dn: dc=b\nchangetype: delete\ncn: stray\n\n\
                dn: dc=c\nchangetype: modify\nreplace: cn\ncn: v\n-\n\n";
    let mut reader = reader_for(ldif);

    let mut emitted = 0u64;
    loop {
        match reader.read_change_record(false) {
            Ok(Some(_)) => emitted += 1,
            Ok(None) => break,
            Err(e) => assert!(e.can_continue(), "unexpected fatal error: {e}"),
        }
    }

    assert_eq!(emitted, 2);
    assert_eq!(reader.entries_read(), 3);
    assert_eq!(reader.entries_ignored(), 0);
    assert_eq!(reader.entries_rejected(), 1);
    assert_eq!(
        reader.entries_read(),
        emitted + reader.entries_ignored() + reader.entries_rejected()
    );
}

#[test]
fn change_records_default_to_add_when_enabled() {
    let ldif = "dn: dc=x\nobjectClass: top\ndc: x\n\n";
    let mut reader = reader_for(ldif);
    let change = reader.read_change_record(true).unwrap().expect("one change");
    assert!(matches!(change, ChangeRecord::Add(_)));

    let mut reader = reader_for(ldif);
    let err = reader.read_change_record(false).unwrap_err();
    assert!(!err.can_continue());
    let message = err.to_string();
    assert!(message.contains("add, delete, modify, moddn, modrdn"), "got: {message}");
}

#[test]
fn unknown_changetype_enumerates_the_permitted_set() {
    let reject = SharedBuf::new();
    let config = config_for("dn: dc=x\nchangetype: frobnicate\n\n").with_reject_writer(reject.clone());
    let mut reader = reader_with(config);
    let err = reader.read_change_record(false).unwrap_err();
    assert!(!err.can_continue());
    let message = err.to_string();
    assert!(message.contains("frobnicate"));
    assert!(message.contains("add, delete, modify, moddn, modrdn"));
    assert_eq!(reject.blocks(), 1);
}

#[test]
fn reject_channel_gets_one_block_per_parse_error() {
    let reject = SharedBuf::new();
    let ldif = "dn: dc=a\ncn: x\ncn: x\n\n\
                no colon here\n\n\
                dn: dc=ok\nobjectClass: top\n\n";
    let config = config_for(ldif).with_reject_writer(reject.clone());
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);

    assert_eq!(entries.len(), 1);
    assert_eq!(errors.len(), 2);
    assert_eq!(reject.blocks(), 2);
    assert_eq!(reader.entries_rejected(), 2);
}

#[test]
fn reject_last_entry_replays_the_record() {
    let reject = SharedBuf::new();
    let config = config_for("dn: dc=x\nobjectClass: top\ncn: a\n\n")
        .with_reject_writer(reject.clone());
    let mut reader = reader_with(config);
    let entry = reader.read_entry().unwrap().expect("one entry");
    assert_eq!(reader.entries_rejected(), 0);

    reader.reject_last_entry("no parent entry exists");
    assert_eq!(reader.entries_rejected(), 1);
    let contents = reject.contents();
    assert!(contents.starts_with("# no parent entry exists\n"));
    assert!(contents.contains("dn: dc=x\n"));
    assert!(contents.contains("cn: a\n"));

    reader.reject_entry(&entry, "post-parse validation failed");
    assert_eq!(reader.entries_rejected(), 2);
    assert_eq!(reject.blocks(), 2);
}

#[test]
fn statistics_handle_tracks_progress() {
    let mut reader = reader_for("dn: dc=a\nobjectClass: top\n\ndn: dc=b\nobjectClass: top\n\n");
    let stats = reader.statistics();
    assert_eq!(stats.entries_read(), 0);
    let (entries, _) = drain_entries(&mut reader);
    assert_eq!(entries.len(), 2);
    assert_eq!(stats.entries_read(), 2);
    assert_eq!(stats.entries_ignored(), 0);
    assert_eq!(stats.entries_rejected(), 0);
}

#[derive(Default)]
struct CountingPlugin {
    begun: AtomicUsize,
    ended: AtomicUsize,
    seen: AtomicUsize,
}

impl ImportPlugin for CountingPlugin {
    fn begin_import_session(&self) {
        self.begun.fetch_add(1, Ordering::SeqCst);
    }

    fn end_import_session(&self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }

    fn process_entry(&self, entry: &ldif_reader::Entry) -> PluginVerdict {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if entry.dn().to_string().contains("bad") {
            PluginVerdict::Reject(Some("flagged by test plugin".to_string()))
        } else {
            PluginVerdict::Continue
        }
    }
}

#[test]
fn plugins_bracket_the_session_and_may_reject() {
    let plugin = Arc::new(CountingPlugin::default());
    let reject = SharedBuf::new();
    let ldif = "dn: dc=good\nobjectClass: top\n\ndn: dc=bad\nobjectClass: top\n\n";
    let config = config_for(ldif)
        .with_import_plugins(true)
        .add_plugin(plugin.clone())
        .with_reject_writer(reject.clone());
    let mut reader = reader_with(config);
    assert_eq!(plugin.begun.load(Ordering::SeqCst), 1);

    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].dn(), &Dn::parse("dc=good").unwrap());
    assert_eq!(plugin.seen.load(Ordering::SeqCst), 2);
    assert_eq!(reader.entries_rejected(), 1);
    let contents = reject.contents();
    assert!(contents.contains("flagged by test plugin"));

    reader.close();
    reader.close();
    assert_eq!(plugin.ended.load(Ordering::SeqCst), 1, "close is idempotent");
}

#[test]
fn empty_values_and_root_dn() {
    let mut reader = reader_for("dn: dc=x\ncn:\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(attr_value(&entries[0], "cn"), b"");

    let mut reader = reader_for("dn:\nobjectClass: top\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert!(entries[0].dn().is_root());
}

#[test]
fn operational_attributes_are_split_from_user_attributes() {
    let ldif = "dn: dc=x\nobjectClass: top\ncn: a\ncreateTimestamp: 20130516200520Z\n\n";
    let mut reader = reader_for(ldif);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());

    let entry = &entries[0];
    assert!(entry.user_attributes().iter().any(|(ty, _)| ty.name() == "cn"));
    assert!(entry
        .operational_attributes()
        .iter()
        .any(|(ty, _)| ty.name() == "createTimestamp"));
    assert!(!entry.user_attributes().iter().any(|(ty, _)| ty.name() == "createTimestamp"));
}

#[test]
fn schema_validation_adds_superior_classes() {
    let ldif = "dn: cn=doe,dc=x\nobjectClass: person\ncn: doe\nsn: Doe\n\n";
    let mut reader = reader_for(ldif);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert!(entries[0].has_object_class("person"));
    assert!(entries[0].has_object_class("top"), "superior class added implicitly");
}

#[test]
fn schema_violations_are_rejected() {
    // person requires sn.
    let mut reader = reader_for("dn: cn=doe,dc=x\nobjectClass: person\ncn: doe\n\n");
    let (entries, errors) = drain_entries(&mut reader);
    assert!(entries.is_empty());
    assert_eq!(errors.len(), 1);
    assert_eq!(reader.entries_rejected(), 1);

    // Without schema checking the same record is fine.
    let config = config_for("dn: cn=doe,dc=x\nobjectClass: person\ncn: doe\n\n")
        .with_schema_validation(false);
    let mut reader = reader_with(config);
    let (entries, errors) = drain_entries(&mut reader);
    assert!(errors.is_empty());
    assert_eq!(entries.len(), 1);
}
