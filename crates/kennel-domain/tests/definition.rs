//! End-to-end checks of the generated domain definitions.

use kennel_domain::{domain_xml, Element, Mount};

#[test]
fn test_definition_with_shared_folder() {
    let xml = domain_xml("foo", "<domain></domain>", &[Mount::new("foo", "bar")], None).unwrap();
    assert_eq!(
        xml,
        r#"<domain><name>foo</name><uuid>foo</uuid><devices><filesystem type="mount"><source dir="foo" /><target dir="bar" /></filesystem></devices></domain>"#
    );
}

#[test]
fn test_definition_with_shared_folder_and_network() {
    let xml = domain_xml(
        "foo",
        "<domain></domain>",
        &[Mount::new("foo", "bar")],
        Some("foo"),
    )
    .unwrap();
    assert_eq!(
        xml,
        r#"<domain><name>foo</name><uuid>foo</uuid><devices><filesystem type="mount"><source dir="foo" /><target dir="bar" /></filesystem><interface type="network"><source network="foo" /></interface></devices></domain>"#
    );
}

#[test]
fn test_realistic_template_keeps_unrelated_content() {
    let template = r#"<domain type="lxc">
  <name>template</name>
  <memory unit="KiB">524288</memory>
  <os>
    <type>exe</type>
    <init>/sbin/init</init>
  </os>
  <devices>
    <console type="pty"/>
  </devices>
</domain>"#;

    let xml = domain_xml(
        "sbx-42",
        template,
        &[Mount::new("/srv/kennel/sbx-42", "/mnt/shared")],
        Some("kennel-net"),
    )
    .unwrap();

    let root = Element::parse(&xml).unwrap();
    assert_eq!(root.attr("type"), Some("lxc"));
    assert_eq!(root.find("name").unwrap().text(), "sbx-42");
    assert_eq!(root.find("uuid").unwrap().text(), "sbx-42");
    assert_eq!(root.find("memory").unwrap().text(), "524288");
    assert_eq!(root.find("os").unwrap().find("init").unwrap().text(), "/sbin/init");

    let devices: Vec<&str> = root
        .find("devices")
        .unwrap()
        .elements()
        .map(Element::name)
        .collect();
    assert_eq!(devices, ["console", "filesystem", "interface"]);

    // Indentation of the template survives.
    assert!(xml.starts_with("<domain type=\"lxc\">\n  <name>sbx-42</name>\n  <memory unit=\"KiB\">"));
}
