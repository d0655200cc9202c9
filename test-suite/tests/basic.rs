// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveDateTime};
use xml_map::de::ErrorKind;
use xml_map_derive::Mapped;

#[derive(Debug, Default, Mapped, PartialEq)]
struct Person {
    name: Option<String>,

    #[xml_map(rename = "birthDate")]
    birth: Option<NaiveDateTime>,

    #[xml_map(list = "tag")]
    tags: Vec<String>,

    age: Option<i64>,

    #[xml_map(cdata)]
    bio: Option<String>,
}

#[derive(Debug, Mapped, PartialEq)]
#[xml_map(rename = "basic.Counter")]
struct Counter {
    id: String,

    #[xml_map(default)]
    count: i64,

    #[xml_map(skip)]
    cached: Option<String>,
}

#[derive(Debug, Default, Mapped, PartialEq)]
struct Home {
    city: String,
    street: Option<String>,
}

#[derive(Debug, Default, Mapped, PartialEq)]
struct Contact {
    name: String,
    home: Option<Home>,
}

#[derive(Debug, Default, Mapped, PartialEq)]
struct Note {
    body: Option<String>,
}

#[derive(Debug, Default, Mapped, PartialEq)]
struct Envelope {
    note: Option<Note>,

    #[xml_map(list = "attachment")]
    attachments: Vec<Note>,
}

fn ada_birth() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1815, 12, 10)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn ada() -> Person {
    Person {
        name: Some("Ada".to_owned()),
        birth: Some(ada_birth()),
        tags: vec!["math".to_owned(), "logic".to_owned()],
        ..Default::default()
    }
}

#[test]
fn deserialize() {
    let _ = env_logger::builder().is_test(true).try_init();
    let person: Person = xml_map::from_str(
        "<person><name>Ada</name><birthDate>1815-12-10T00:00:00</birthDate>\
         <tag>math</tag><tag>logic</tag></person>",
    )
    .unwrap();
    assert_eq!(person, ada());
}

#[test]
fn serialize() {
    let _ = env_logger::builder().is_test(true).try_init();
    let out = xml_map::to_string(&ada(), Some("person")).unwrap();
    assert_eq!(
        out,
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <person><name>Ada</name><birthDate>1815-12-10T00:00:00</birthDate>\
         <tag>math</tag><tag>logic</tag></person>"
    );
}

#[test]
fn round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let original = Person {
        name: Some("Ada Lovelace".to_owned()),
        birth: Some(ada_birth()),
        tags: vec!["math".to_owned(), "logic".to_owned(), "engines".to_owned()],
        age: Some(36),
        bio: Some("wrote <notes> & ]]> more".to_owned()),
    };
    let serialized = xml_map::to_string(&original, Some("person")).unwrap();
    log::info!("serialized: {:?}", serialized);
    let round_tripped: Person = xml_map::from_str(&serialized).unwrap();
    assert_eq!(original, round_tripped);
}

#[test]
fn absent_fields_are_omitted() {
    let _ = env_logger::builder().is_test(true).try_init();
    let person = Person {
        age: Some(7),
        ..Default::default()
    };
    let out = xml_map::to_string(&person, Some("person")).unwrap();
    assert!(out.ends_with("<person><age>7</age></person>"), "{}", out);

    let read: Person = xml_map::from_str("<person><age>7</age></person>").unwrap();
    assert_eq!(read, person);
    assert_eq!(read.name, None);
    assert!(read.tags.is_empty());
}

#[test]
fn unknown_elements_are_ignored() {
    let _ = env_logger::builder().is_test(true).try_init();
    let person: Person = xml_map::from_str(
        r#"<?xml version="1.0"?>
        <person>
            <nickname>Countess</nickname>
            <name>Ada</name>
            <family><name>Byron</name><tag>poetry</tag></family>
            <birthDate>1815-12-10T00:00:00</birthDate>
            <tag>math</tag>
            <!-- comment -->
            <extra/>
            <tag>logic</tag>
            <trailer><deep><deeper>x</deeper></deep></trailer>
        </person>"#,
    )
    .unwrap();
    assert_eq!(person, ada());
}

#[test]
fn dates_drop_fraction_and_offset() {
    let _ = env_logger::builder().is_test(true).try_init();
    let person: Person =
        xml_map::from_str("<person><birthDate>1815-12-10T00:00:00.25+01:00</birthDate></person>")
            .unwrap();
    assert_eq!(person.birth, Some(ada_birth()));
    let person: Person =
        xml_map::from_str("<person><birthDate>1815-12-10T00:00:00-05:00</birthDate></person>")
            .unwrap();
    assert_eq!(person.birth, Some(ada_birth()));
}

#[test]
fn cdata_and_escapes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let person: Person = xml_map::from_str(
        "<person><name>A &amp; B</name><bio><![CDATA[<b>bold</b> & more]]></bio></person>",
    )
    .unwrap();
    assert_eq!(person.name.as_deref(), Some("A & B"));
    assert_eq!(person.bio.as_deref(), Some("<b>bold</b> & more"));

    let out = xml_map::to_string(&person, Some("person")).unwrap();
    assert!(
        out.contains("<bio><![CDATA[<b>bold</b> & more]]></bio>"),
        "{}",
        out
    );
    assert!(out.contains("<name>A &amp; B</name>"), "{}", out);
}

#[test]
fn bad_int() {
    let _ = env_logger::builder().is_test(true).try_init();
    let e = xml_map::from_str::<Person>("<person>\n  <age>old</age>\n</person>").unwrap_err();
    assert_matches!(e.kind(), ErrorKind::Conversion { tag, text, .. } => {
        assert_eq!(tag, "age");
        assert_eq!(text, "old");
    });
    assert_eq!(e.stack().len(), 2);
    assert_eq!(e.stack()[1].name, "age");
    let pos = e.stack()[1].pos.unwrap();
    assert_eq!(pos.row, 1);
}

#[test]
fn bad_date() {
    let _ = env_logger::builder().is_test(true).try_init();
    let e = xml_map::from_str::<Person>("<person><birthDate>last tuesday</birthDate></person>")
        .unwrap_err();
    assert_matches!(e.kind(), ErrorKind::DateParse { tag, text, .. } => {
        assert_eq!(tag, "birthDate");
        assert_eq!(text, "last tuesday");
    });
}

#[test]
fn malformed() {
    let _ = env_logger::builder().is_test(true).try_init();
    let e = xml_map::from_str::<Person>("<person><name>Ada</person>").unwrap_err();
    assert_matches!(e.kind(), ErrorKind::Source(_));
    let e = xml_map::from_str::<Person>("").unwrap_err();
    assert_matches!(e.kind(), ErrorKind::Source(_) | ErrorKind::Msg(_));
}

#[test]
fn required_default_and_skip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let c: Counter = xml_map::from_str("<counter><id>a</id><cached>x</cached></counter>").unwrap();
    assert_eq!(
        c,
        Counter {
            id: "a".to_owned(),
            count: 0,
            cached: None,
        }
    );

    let e = xml_map::from_str::<Counter>("<counter><count>3</count></counter>").unwrap_err();
    assert_matches!(e.kind(), ErrorKind::Value(v) => {
        assert_eq!(v.to_string(), "basic.Counter is missing required field id");
    });

    let c = Counter {
        id: "b".to_owned(),
        count: 2,
        cached: Some("not written".to_owned()),
    };
    let out = xml_map::to_string(&c, Some("counter")).unwrap();
    assert!(
        out.ends_with("<counter><id>b</id><count>2</count></counter>"),
        "{}",
        out
    );
}

#[test]
fn no_root_tag() {
    let _ = env_logger::builder().is_test(true).try_init();
    xml_map::schema::Registry::global()
        .register_type::<Person>()
        .unwrap();
    let object = xml_map::Mapped::to_object(&ada());
    let mut tokens = Vec::new();
    xml_map::serialize(&object).to_sink(&mut tokens).unwrap();
    use xml_map::token::Token;
    assert_eq!(tokens.first(), Some(&Token::start("name")));
    assert_eq!(tokens.last(), Some(&Token::end("tag")));
    assert_eq!(tokens.len(), 12);
}

#[test]
fn empty_strings_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let original = Person {
        name: Some(String::new()),
        tags: vec!["a".to_owned(), String::new(), "b".to_owned()],
        ..Default::default()
    };
    let serialized = xml_map::to_string(&original, Some("person")).unwrap();
    let round_tripped: Person = xml_map::from_str(&serialized).unwrap();
    assert_eq!(original, round_tripped);

    let original = Contact {
        name: String::new(),
        home: Some(Home {
            city: String::new(),
            street: None,
        }),
    };
    let serialized = xml_map::to_string(&original, Some("contact")).unwrap();
    let round_tripped: Contact = xml_map::from_str(&serialized).unwrap();
    assert_eq!(original, round_tripped);
}

#[test]
fn empty_objects_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let original = Envelope {
        note: Some(Note { body: None }),
        attachments: vec![
            Note { body: None },
            Note {
                body: Some("x".to_owned()),
            },
            Note { body: None },
        ],
    };
    let serialized = xml_map::to_string(&original, Some("envelope")).unwrap();
    log::info!("serialized: {:?}", serialized);
    let round_tripped: Envelope = xml_map::from_str(&serialized).unwrap();
    assert_eq!(original, round_tripped);

    let read: Envelope = xml_map::from_str("<envelope><note/></envelope>").unwrap();
    assert_eq!(read.note, Some(Note { body: None }));
    let read: Envelope = xml_map::from_str("<envelope/>").unwrap();
    assert_eq!(read, Envelope::default());
}

#[test]
fn empty_non_string_scalars_are_absent() {
    let _ = env_logger::builder().is_test(true).try_init();
    let read: Person =
        xml_map::from_str("<person><age/><birthDate></birthDate><name/></person>").unwrap();
    assert_eq!(read.age, None);
    assert_eq!(read.birth, None);
    assert_eq!(read.name.as_deref(), Some(""));
}
