//! End-to-end generation tests on synthetic templates.

mod common;

use common::{assert_well_formed, main_xml, part_xml, png, TemplateBuilder};
use docmerge::{
    generate_bytes, generate_file, Dimension, Document, Error, GenerateOptions, ImageOptions,
    Outcome, PlanBuilder, ReplacementPlan, TextOptions, Warning,
};
use std::fs;

fn rank_table() -> TemplateBuilder {
    TemplateBuilder::new()
        .paragraph("Category: ${category}")
        .table(&[&["Rank", "Name"], &["${rank}", "${name}"]])
        .paragraph("End of results")
}

#[test]
fn single_replacement_is_well_formed() {
    let template = TemplateBuilder::new().paragraph("Hello ${name}!").build();
    let plan = PlanBuilder::new().replace("name", "Jane").build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);

    assert!(xml.contains("Hello Jane!"));
    assert!(!xml.contains("${name}"));
    assert_eq!(generated.report.text_replacements, 1);
    assert_well_formed(&xml);
}

#[test]
fn clone_rows_in_append_order() {
    let plan = PlanBuilder::new()
        .replace("category", "Elite men")
        .create_clone("rank")
        .add_to_clone("rank", "rank", "1", TextOptions::default())
        .add_to_clone("rank", "name", "James", TextOptions::default())
        .create_clone("rank")
        .add_to_clone("rank", "rank", "2", TextOptions::default())
        .add_to_clone("rank", "name", "Robert", TextOptions::default())
        .create_clone("rank")
        .add_to_clone("rank", "rank", "3", TextOptions::default())
        .add_to_clone("rank", "name", "Mary", TextOptions::default())
        .build();

    let generated = generate_bytes(rank_table().build(), &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);
    assert_well_formed(&xml);

    // Header row plus three clones
    assert_eq!(xml.matches("<w:tr>").count(), 4);
    let james = xml.find("James").unwrap();
    let robert = xml.find("Robert").unwrap();
    let mary = xml.find("Mary").unwrap();
    assert!(james < robert && robert < mary);
    assert!(xml.find("Rank").unwrap() < james);
    assert!(mary < xml.find("End of results").unwrap());

    assert!(!xml.contains("${"));
    assert_eq!(generated.report.cloned_rows, 3);
}

#[test]
fn empty_plan_leaves_template_unchanged() {
    let template = rank_table().build();
    let original = main_xml(&template);

    let generated =
        generate_bytes(template, &ReplacementPlan::default(), &GenerateOptions::new()).unwrap();
    assert_eq!(main_xml(&generated.bytes), original);

    let mut doc = Document::from_bytes(rank_table().build()).unwrap();
    doc.clone_row("rank", 0).unwrap();
    assert_eq!(doc.main_xml(), original);
}

#[test]
fn clone_tokens_without_values_keep_their_suffix() {
    let plan = PlanBuilder::new()
        .create_clone("rank")
        .add_to_clone("rank", "rank", "1", TextOptions::default())
        .build();

    let generated = generate_bytes(rank_table().build(), &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);
    assert!(xml.contains("${name#1}"));
    assert!(!xml.contains("${rank"));
}

#[test]
fn missing_clone_anchor_is_fatal() {
    let plan = PlanBuilder::new()
        .create_clone("position")
        .add_to_clone("position", "position", "1", TextOptions::default())
        .build();

    let result = generate_bytes(rank_table().build(), &plan, &GenerateOptions::new());
    assert!(matches!(result, Err(Error::TemplateStructure(_))));
}

#[test]
fn multiline_and_escaping() {
    let template = TemplateBuilder::new()
        .paragraph("${address}")
        .paragraph("${company}")
        .build();
    let plan = PlanBuilder::new()
        .replace_with_options(
            "address",
            "1 Main Street\nSpringfield",
            TextOptions::new().with_multiline(true),
        )
        .replace("company", "A & B <Partners>")
        .build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);
    assert_well_formed(&xml);

    assert!(xml.contains(
        r#"1 Main Street</w:t><w:br/><w:t xml:space="preserve">Springfield"#
    ));
    assert!(xml.contains("A &amp; B &lt;Partners&gt;"));
}

#[test]
fn html_entities_are_decoded_and_illegal_references_kept() {
    let template = TemplateBuilder::new()
        .paragraph("${price}")
        .paragraph("${control}")
        .build();
    let plan = PlanBuilder::new()
        .replace("price", "caf&eacute; &euro;5 &copy;")
        .replace("control", "a&#0;b&#1;c")
        .build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);
    assert_well_formed(&xml);

    assert!(xml.contains("café €5 ©"));
    assert!(!xml.contains('\0'));
    assert!(!xml.contains('\u{1}'));
    assert!(xml.contains("a&amp;#0;b&amp;#1;c"));
}

#[test]
fn bold_markup_splits_runs() {
    let template = TemplateBuilder::new().paragraph("${note}").build();
    let plan = PlanBuilder::new()
        .replace("note", "Start at <B>9:00</B> sharp")
        .build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);
    assert_well_formed(&xml);
    assert!(xml.contains(r#"<w:rPr><w:b/></w:rPr><w:t xml:space="preserve">9:00</w:t>"#));
}

#[test]
fn limit_caps_occurrences() {
    let template = TemplateBuilder::new()
        .paragraph("${x}")
        .paragraph("${x}")
        .paragraph("${x}")
        .build();
    let plan = PlanBuilder::new()
        .replace_with_options("x", "done", TextOptions::new().with_limit(2))
        .build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);
    assert_eq!(xml.matches("done").count(), 2);
    assert_eq!(xml.matches("${x}").count(), 1);
}

#[test]
fn split_run_placeholder_is_replaced() {
    let template = TemplateBuilder::new()
        .raw(concat!(
            r#"<w:p><w:r><w:t>Dear $</w:t></w:r>"#,
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t>{first</w:t></w:r>"#,
            r#"<w:r><w:t>_name}</w:t></w:r></w:p>"#
        ))
        .build();
    let plan = PlanBuilder::new().replace("first_name", "Ada").build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);
    assert_well_formed(&xml);
    assert!(xml.contains("Dear Ada"));
}

#[test]
fn header_tokens_are_replaced() {
    let template = TemplateBuilder::new()
        .header("Report for ${client}")
        .paragraph("Client: ${client}")
        .build();
    let plan = PlanBuilder::new().replace("client", "Acme").build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    assert!(main_xml(&generated.bytes).contains("Client: Acme"));
    let header = part_xml(&generated.bytes, "word/header1.xml");
    assert!(header.contains("Report for Acme"));
    assert_eq!(generated.report.text_replacements, 2);
}

#[test]
fn image_is_embedded_and_registered() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("logo.png"), png(40, 20)).unwrap();

    let template = TemplateBuilder::new().paragraph("Logo: ${logo} here").build();
    let plan = PlanBuilder::new()
        .replace_with_image(
            "logo",
            "logo.png",
            ImageOptions::new().with_width(Dimension::mm(40.0)),
        )
        .build();
    let options = GenerateOptions::new().with_base_dir(dir.path());

    let generated = generate_bytes(template, &plan, &options).unwrap();
    assert_eq!(generated.report.image_replacements, 1);
    assert!(generated.report.warnings.is_empty());

    let xml = main_xml(&generated.bytes);
    assert_well_formed(&xml);
    assert!(!xml.contains("${logo}"));
    assert!(xml.contains(r#"<wp:extent cx="1440000" cy="720000"/>"#));
    assert!(xml.contains(r#"r:embed="rId2""#));
    assert!(xml.contains(r#"Logo: </w:t><w:drawing>"#));

    let rels = part_xml(&generated.bytes, "word/_rels/document.xml.rels");
    assert_well_formed(&rels);
    assert!(rels.contains(r#"Id="rId2""#));
    assert!(rels.contains(r#"Target="media/docmerge_image1.png""#));

    let types = part_xml(&generated.bytes, "[Content_Types].xml");
    assert!(types.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));

    let container = docmerge::OoxmlContainer::from_bytes(generated.bytes).unwrap();
    assert_eq!(
        container.read_binary("word/media/docmerge_image1.png").unwrap(),
        png(40, 20)
    );
}

#[test]
fn image_in_header_gets_its_own_relationship() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("logo.png"), png(10, 10)).unwrap();

    let template = TemplateBuilder::new()
        .header("${logo}")
        .paragraph("${logo}")
        .build();
    let plan = PlanBuilder::new()
        .replace_with_image("logo", dir.path().join("logo.png"), ImageOptions::new())
        .build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    assert_eq!(generated.report.image_replacements, 2);

    let header_rels = part_xml(&generated.bytes, "word/_rels/header1.xml.rels");
    assert!(header_rels.contains(r#"Id="rId1""#));
    assert!(header_rels.contains(r#"Target="media/docmerge_image1.png""#));

    // Pictures in one package need distinct drawing ids
    let main = main_xml(&generated.bytes);
    let header = part_xml(&generated.bytes, "word/header1.xml");
    assert!(main.contains(r#"<wp:docPr id="1""#));
    assert!(header.contains(r#"<wp:docPr id="2""#));
}

#[test]
fn missing_image_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let template = TemplateBuilder::new()
        .paragraph("${logo}")
        .paragraph("${name}")
        .build();
    let plan = PlanBuilder::new()
        .replace_with_image("logo", "absent.png", ImageOptions::new())
        .replace("name", "Jane")
        .build();
    let options = GenerateOptions::new().with_base_dir(dir.path());

    let generated = generate_bytes(template, &plan, &options).unwrap();
    assert_eq!(
        generated.report.warnings,
        vec![Warning::MissingAsset {
            token: "logo".to_string(),
            path: dir.path().join("absent.png"),
        }]
    );

    let xml = main_xml(&generated.bytes);
    assert!(xml.contains("${logo}"));
    assert!(xml.contains("Jane"));
}

#[test]
fn clone_rows_with_images() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.png"), png(8, 8)).unwrap();

    let template = TemplateBuilder::new()
        .table(&[&["${rank}", "${avatar}"]])
        .build();
    let plan = PlanBuilder::new()
        .create_clone("rank")
        .add_to_clone("rank", "rank", "1", TextOptions::default())
        .add_image_to_clone(
            "rank",
            "avatar",
            "a.png",
            ImageOptions::new().with_height(Dimension::mm(10.0)),
        )
        .create_clone("rank")
        .add_to_clone("rank", "rank", "2", TextOptions::default())
        .add_image_to_clone("rank", "avatar", "a.png", ImageOptions::new())
        .build();
    let options = GenerateOptions::new().with_base_dir(dir.path());

    let generated = generate_bytes(template, &plan, &options).unwrap();
    let xml = main_xml(&generated.bytes);
    assert_well_formed(&xml);
    assert_eq!(xml.matches("<w:drawing>").count(), 2);
    assert!(xml.contains(r#"<wp:extent cx="360000" cy="360000"/>"#));
    assert!(!xml.contains("${"));
}

#[test]
fn blocks_are_replaced_and_deleted() {
    let template = TemplateBuilder::new()
        .paragraph("Intro")
        .paragraph("${promo}")
        .paragraph("Limited offer")
        .paragraph("${/promo}")
        .paragraph("${legal}")
        .paragraph("Small print")
        .paragraph("${/legal}")
        .paragraph("Outro")
        .build();
    let plan = PlanBuilder::new()
        .replace_block(
            "promo",
            r#"<w:p><w:r><w:t>No offers today</w:t></w:r></w:p>"#,
        )
        .delete_block("legal")
        .build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);
    assert_well_formed(&xml);
    assert!(xml.contains("No offers today"));
    assert!(!xml.contains("Limited offer"));
    assert!(!xml.contains("Small print"));
    assert!(xml.contains("Intro") && xml.contains("Outro"));
    assert_eq!(generated.report.blocks_replaced, 2);
}

#[test]
fn round_trip_leaves_no_matched_tokens() {
    let template = TemplateBuilder::new()
        .header("${title}")
        .paragraph("${title} / ${subtitle}")
        .table(&[&["${rank}", "${name}"]])
        .build();
    let plan = PlanBuilder::new()
        .replace("title", "Results")
        .replace("subtitle", "Stage 4")
        .create_clone("rank")
        .add_to_clone("rank", "rank", "1", TextOptions::default())
        .add_to_clone("rank", "name", "Lee", TextOptions::default())
        .build();

    let generated = generate_bytes(template, &plan, &GenerateOptions::new()).unwrap();
    let reopened = Document::from_bytes(generated.bytes).unwrap();
    assert!(reopened.variables().is_empty());
}

#[test]
fn json_plan_end_to_end() {
    let plan = ReplacementPlan::from_json(
        r#"{
            "replacements": [{"token": "category", "value": "Juniors"}],
            "clones": [{"key": "rank", "rows": [
                [{"token": "rank", "value": 1}, {"token": "name", "value": "Kim"}],
                [{"token": "rank", "value": 2}, {"token": "name", "value": "Ola"}]
            ]}]
        }"#,
    )
    .unwrap();

    let generated = generate_bytes(rank_table().build(), &plan, &GenerateOptions::new()).unwrap();
    let xml = main_xml(&generated.bytes);
    assert!(xml.contains("Category: Juniors"));
    assert!(xml.find("Kim").unwrap() < xml.find("Ola").unwrap());
}

#[test]
fn cached_destination_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.docx");
    let destination = dir.path().join("out.docx");
    TemplateBuilder::new().paragraph("${name}").write_to(&template);

    let first = PlanBuilder::new().replace("name", "First").build();
    let second = PlanBuilder::new().replace("name", "Second").build();
    let options = GenerateOptions::new();

    let outcome = generate_file(&template, &destination, &first, &options).unwrap();
    assert!(matches!(outcome, Outcome::Generated(_)));
    let bytes = fs::read(&destination).unwrap();
    let modified = fs::metadata(&destination).unwrap().modified().unwrap();

    let outcome = generate_file(&template, &destination, &second, &options).unwrap();
    assert_eq!(outcome, Outcome::Cached);
    assert_eq!(fs::read(&destination).unwrap(), bytes);
    assert_eq!(
        fs::metadata(&destination).unwrap().modified().unwrap(),
        modified
    );

    let outcome =
        generate_file(&template, &destination, &second, &options.with_uncached(true)).unwrap();
    assert!(matches!(outcome, Outcome::Generated(_)));
    assert!(main_xml(&fs::read(&destination).unwrap()).contains("Second"));
}

#[test]
fn missing_template_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    let plan = ReplacementPlan::default();
    let options = GenerateOptions::new().with_base_dir(dir.path());

    let result = generate_file("missing.docx", "out.docx", &plan, &options);
    assert!(matches!(result, Err(Error::NotFound(p)) if p.ends_with("missing.docx")));

    TemplateBuilder::new().write_to(&dir.path().join("t.docx"));
    let result = generate_file("t.docx", "no/such/dir/out.docx", &plan, &options);
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert!(!dir.path().join("no").exists());
}

#[test]
fn failed_save_leaves_no_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.docx");
    TemplateBuilder::new().paragraph("${name}").write_to(&template);

    let destination = dir.path().join("out.docx");
    fs::create_dir(&destination).unwrap();
    fs::write(destination.join("keep.txt"), b"existing").unwrap();

    let plan = PlanBuilder::new().replace("name", "Jane").build();
    let options = GenerateOptions::new().with_uncached(true);
    let result = generate_file(&template, &destination, &plan, &options);
    assert!(matches!(result, Err(Error::Write { ref path, .. }) if *path == destination));

    let document = Document::open(&template).unwrap();
    let result = document.save(&destination);
    assert!(matches!(result, Err(Error::Write { .. })));

    assert!(destination.is_dir());
    assert_eq!(fs::read(destination.join("keep.txt")).unwrap(), b"existing");
    let mut entries: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    entries.sort();
    assert_eq!(entries, ["out.docx", "template.docx"]);
}

#[test]
fn non_word_inputs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let text_file = dir.path().join("notes.docx");
    fs::write(&text_file, b"not a zip").unwrap();
    let result = Document::open(&text_file);
    assert!(matches!(result, Err(Error::NotFound(ref p)) if *p == text_file));
    let result = generate_file(
        &text_file,
        dir.path().join("out.docx"),
        &ReplacementPlan::default(),
        &GenerateOptions::new(),
    );
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert!(!dir.path().join("out.docx").exists());

    let result = generate_bytes(
        b"plain text".to_vec(),
        &ReplacementPlan::default(),
        &GenerateOptions::new(),
    );
    assert!(matches!(result, Err(Error::ZipArchive(_))));

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file("[Content_Types].xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    std::io::Write::write_all(
        &mut zip,
        br#"<Types><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#,
    )
    .unwrap();
    let workbook = zip.finish().unwrap().into_inner();

    let result = generate_bytes(workbook, &ReplacementPlan::default(), &GenerateOptions::new());
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
}
