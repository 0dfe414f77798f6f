use std::cell::RefCell;
use std::num::NonZeroU32;
use std::rc::Rc;

use crate::error::Result;
use crate::interface::{Direction, Interface};
use crate::match_rule::MatchRule;
use crate::org_freedesktop_dbus::{NameFlag, NameReply};
use crate::proto::MessageType;
use crate::{Connection, Flags, Message, MessageKind, ObjectPath, Signature};

type Sent = Rc<RefCell<Vec<Message>>>;

/// A connection whose outgoing messages are parsed back and collected.
fn connection_with_sink() -> (Connection, Sent) {
    let mut conn = Connection::new();
    let sent: Sent = Rc::new(RefCell::new(Vec::new()));
    let sink = sent.clone();

    conn.set_send_callback(Box::new(move |bytes| {
        sink.borrow_mut().push(Message::parse(bytes)?);
        Ok(())
    }));

    (conn, sent)
}

/// Deliver a message the way a remote peer would: through its on-wire form.
fn deliver(conn: &mut Connection, message: Message) -> Result<()> {
    let message = match message.serial() {
        Some(_) => message,
        None => message.with_serial(NonZeroU32::new(999).unwrap()),
    };

    let parsed = Message::parse(&message.to_wire()?)?;
    conn.dispatch(&parsed)
}

#[test]
fn method_call_arguments() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();

    let mut interface = Interface::new("x.Y")?;

    interface.add_method("M")?.set_method_callback(Rc::new(move |_conn, details| {
        details.args.read_struct_begin()?;
        log.borrow_mut().push(details.args.read_byte()? as u64);
        log.borrow_mut().push(details.args.read_u32()? as u64);
        details.args.read_struct_end()?;
        details.args.finish()?;
        Ok(())
    }));

    conn.bind_interface("/", Rc::new(interface), None)?;

    let mut call = Message::method_call(ObjectPath::ROOT, "M")
        .with_interface("x.Y")
        .with_serial(NonZeroU32::new(1).unwrap());

    let body = call.body_buf();
    body.append_arguments(Signature::new(b"(yu)")?)?;
    body.begin_struct()?;
    body.append_byte(0x11)?;
    body.append_u32(0x55443322)?;
    body.end_struct()?;

    deliver(&mut conn, call)?;

    assert_eq!(&*seen.borrow(), &[0x11, 0x55443322]);

    // The dispatcher sent the automatic empty reply.
    let sent = sent.borrow();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        sent[0].kind(),
        MessageKind::MethodReturn { reply_serial } if reply_serial.get() == 1
    ));
    Ok(())
}

#[test]
fn method_call_without_interface_header() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let fired = Rc::new(RefCell::new(0));
    let count = fired.clone();

    let mut interface = Interface::new("x.Y")?;
    interface.add_method("M")?.set_method_callback(Rc::new(move |_conn, _details| {
        *count.borrow_mut() += 1;
        Ok(())
    }));

    conn.bind_interface("/", Rc::new(interface), None)?;

    let call = Message::method_call(ObjectPath::ROOT, "M");
    deliver(&mut conn, call)?;

    assert_eq!(*fired.borrow(), 1);
    assert_eq!(sent.borrow().len(), 1);
    Ok(())
}

#[test]
fn dispatch_errors() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let mut interface = Interface::new("x.Y")?;
    interface.add_method("M")?.set_method_callback(Rc::new(|_conn, _details| Ok(())));
    conn.bind_interface("/obj", Rc::new(interface), None)?;

    // Unknown path.
    deliver(&mut conn, Message::method_call(ObjectPath::new("/missing")?, "M"))?;
    // Unknown interface.
    deliver(
        &mut conn,
        Message::method_call(ObjectPath::new("/obj")?, "M").with_interface("no.Such"),
    )?;
    // Unknown method.
    deliver(
        &mut conn,
        Message::method_call(ObjectPath::new("/obj")?, "Nope").with_interface("x.Y"),
    )?;

    let sent = sent.borrow();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].error_name(), Some("rs.dbuswire.Error.ObjectNotFound"));
    assert_eq!(sent[1].error_name(), Some("rs.dbuswire.Error.InterfaceNotFound"));
    assert_eq!(sent[2].error_name(), Some("rs.dbuswire.Error.MethodNotFound"));
    Ok(())
}

#[test]
fn check_failure_serializes_invalid_argument() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let mut interface = Interface::new("x.Y")?;
    interface.add_method("M")?.set_method_callback(Rc::new(|_conn, details| {
        // The argument is a u32; reading a string is a check failure.
        details.args.read_str()?;
        Ok(())
    }));

    conn.bind_interface("/", Rc::new(interface), None)?;

    let mut call = Message::method_call(ObjectPath::ROOT, "M").with_interface("x.Y");
    call.body_buf().append_arguments(Signature::UINT32)?;
    call.body_buf().append_u32(7)?;

    deliver(&mut conn, call)?;

    let sent = sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].error_name(), Some("rs.dbuswire.Error.InvalidArgument"));
    Ok(())
}

#[test]
fn no_reply_expected_suppresses_replies() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let call = Message::method_call(ObjectPath::new("/missing")?, "M")
        .with_flags(Flags::NO_REPLY_EXPECTED);
    deliver(&mut conn, call)?;

    assert!(sent.borrow().is_empty());
    Ok(())
}

#[test]
fn manual_reply_suppresses_automatic_reply() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let mut interface = Interface::new("x.Y")?;
    interface.add_method("M")?.set_method_callback(Rc::new(|_conn, details| {
        details.manual_reply = true;
        Ok(())
    }));

    conn.bind_interface("/", Rc::new(interface), None)?;
    deliver(&mut conn, Message::method_call(ObjectPath::ROOT, "M").with_interface("x.Y"))?;

    assert!(sent.borrow().is_empty());
    Ok(())
}

#[test]
fn introspection_xml() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let mut interface = Interface::new("a.b")?;
    interface
        .add_method("Foo")?
        .add_argument(Direction::In, Some("name"), Signature::STRING)
        .add_argument(Direction::Out, Some("result"), Signature::STRING)
        .set_method_callback(Rc::new(|_conn, _details| Ok(())));

    conn.bind_interface("/p", Rc::new(interface), None)?;
    conn.bind_interface("/p/child", Rc::new(Interface::new("c.d")?), None)?;

    let call = Message::method_call(ObjectPath::new("/p")?, "Introspect")
        .with_interface("org.freedesktop.DBus.Introspectable");
    deliver(&mut conn, call)?;

    let sent = sent.borrow();
    assert_eq!(sent.len(), 1);

    let mut body = sent[0].body();
    let xml = body.read_str()?;

    assert!(xml.starts_with("<!DOCTYPE node PUBLIC"));

    let flat = xml.replace(['\n', '\t'], "");
    assert!(flat.contains(
        "<interface name=\"a.b\">\
         <method name=\"Foo\">\
         <arg type=\"s\" name=\"name\" direction=\"in\"/>\
         <arg type=\"s\" name=\"result\" direction=\"out\"/>\
         </method></interface>"
    ));

    // Built-ins and child stubs are listed.
    assert!(flat.contains("<interface name=\"org.freedesktop.DBus.Introspectable\">"));
    assert!(flat.contains("<interface name=\"org.freedesktop.DBus.Properties\">"));
    assert!(flat.contains("<node name=\"child\"/>"));
    Ok(())
}

#[test]
fn property_get() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let mut interface = Interface::new("a.b")?;
    interface
        .add_property("P", Signature::INT32)?
        .set_getter(Rc::new(|body| body.append_i32(42)));

    conn.bind_interface("/obj", Rc::new(interface), None)?;

    let mut call = Message::method_call(ObjectPath::new("/obj")?, "Get")
        .with_interface("org.freedesktop.DBus.Properties");
    let body = call.body_buf();
    body.append_arguments(Signature::new(b"ss")?)?;
    body.append_str("a.b")?;
    body.append_str("P")?;

    deliver(&mut conn, call)?;

    let sent = sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].signature(), Signature::VARIANT);

    let mut body = sent[0].body();
    let (_, inner) = body.read_variant_begin()?;
    assert_eq!(inner, Signature::INT32);
    assert_eq!(body.read_i32()?, 42);
    body.read_variant_end()?;
    body.finish()?;
    Ok(())
}

#[test]
fn property_get_all() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let state = Rc::new(RefCell::new(7i32));
    let value = state.clone();

    let mut interface = Interface::new("a.b")?;
    interface
        .add_property("Readable", Signature::INT32)?
        .set_getter(Rc::new(move |body| body.append_i32(*value.borrow())));
    interface
        .add_property("WriteOnly", Signature::STRING)?
        .set_setter(Rc::new(|_args| Ok(())));

    conn.bind_interface("/obj", Rc::new(interface), None)?;

    let mut call = Message::method_call(ObjectPath::new("/obj")?, "GetAll")
        .with_interface("org.freedesktop.DBus.Properties");
    call.body_buf().append_arguments(Signature::STRING)?;
    call.body_buf().append_str("a.b")?;

    deliver(&mut conn, call)?;

    let sent = sent.borrow();
    assert_eq!(sent[0].signature().as_str(), "a{sv}");

    // Only the readable property appears.
    let mut body = sent[0].body();
    body.read_array_begin()?;
    body.read_dict_entry_begin()?;
    assert_eq!(body.read_str()?, "Readable");
    let (_, inner) = body.read_variant_begin()?;
    assert_eq!(inner, Signature::INT32);
    assert_eq!(body.read_i32()?, 7);
    body.read_variant_end()?;
    body.read_dict_entry_end()?;
    body.read_array_end()?;
    body.finish()?;
    Ok(())
}

#[test]
fn property_set() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let state = Rc::new(RefCell::new(0i32));
    let slot = state.clone();

    let mut interface = Interface::new("a.b")?;
    interface
        .add_property("P", Signature::INT32)?
        .set_getter(Rc::new(|body| body.append_i32(0)))
        .set_setter(Rc::new(move |args| {
            *slot.borrow_mut() = args.read_i32()?;
            Ok(())
        }));

    conn.bind_interface("/obj", Rc::new(interface), None)?;

    let mut call = Message::method_call(ObjectPath::new("/obj")?, "Set")
        .with_interface("org.freedesktop.DBus.Properties");
    let body = call.body_buf();
    body.append_arguments(Signature::new(b"ssv")?)?;
    body.append_str("a.b")?;
    body.append_str("P")?;
    body.begin_variant(Signature::INT32)?;
    body.append_i32(9)?;
    body.end_variant()?;

    deliver(&mut conn, call)?;

    assert_eq!(*state.borrow(), 9);
    assert!(matches!(
        sent.borrow()[0].kind(),
        MessageKind::MethodReturn { .. }
    ));
    Ok(())
}

#[test]
fn property_set_type_mismatch() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let mut interface = Interface::new("a.b")?;
    interface
        .add_property("P", Signature::INT32)?
        .set_setter(Rc::new(|_args| Ok(())));

    conn.bind_interface("/obj", Rc::new(interface), None)?;

    let mut call = Message::method_call(ObjectPath::new("/obj")?, "Set")
        .with_interface("org.freedesktop.DBus.Properties");
    let body = call.body_buf();
    body.append_arguments(Signature::new(b"ssv")?)?;
    body.append_str("a.b")?;
    body.append_str("P")?;
    body.begin_variant(Signature::STRING)?;
    body.append_str("not an int")?;
    body.end_variant()?;

    deliver(&mut conn, call)?;

    assert_eq!(
        sent.borrow()[0].error_name(),
        Some("rs.dbuswire.Error.InvalidArgument")
    );
    Ok(())
}

#[test]
fn read_only_and_write_only_properties() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let mut interface = Interface::new("a.b")?;
    interface
        .add_property("ReadOnly", Signature::INT32)?
        .set_getter(Rc::new(|body| body.append_i32(1)));
    interface
        .add_property("WriteOnly", Signature::INT32)?
        .set_setter(Rc::new(|_args| Ok(())));

    conn.bind_interface("/obj", Rc::new(interface), None)?;

    let mut set = Message::method_call(ObjectPath::new("/obj")?, "Set")
        .with_interface("org.freedesktop.DBus.Properties");
    let body = set.body_buf();
    body.append_arguments(Signature::new(b"ssv")?)?;
    body.append_str("a.b")?;
    body.append_str("ReadOnly")?;
    body.begin_variant(Signature::INT32)?;
    body.append_i32(2)?;
    body.end_variant()?;
    deliver(&mut conn, set)?;

    let mut get = Message::method_call(ObjectPath::new("/obj")?, "Get")
        .with_interface("org.freedesktop.DBus.Properties");
    let body = get.body_buf();
    body.append_arguments(Signature::new(b"ss")?)?;
    body.append_str("a.b")?;
    body.append_str("WriteOnly")?;
    deliver(&mut conn, get)?;

    let sent = sent.borrow();
    assert_eq!(sent[0].error_name(), Some("rs.dbuswire.Error.ReadOnlyProperty"));
    assert_eq!(sent[1].error_name(), Some("rs.dbuswire.Error.WriteOnlyProperty"));
    Ok(())
}

#[test]
fn match_scan_runs_after_method_dispatch() -> Result<()> {
    let (mut conn, _sent) = connection_with_sink();

    let order = Rc::new(RefCell::new(Vec::new()));

    let mut interface = Interface::new("x.Y")?;
    let log = order.clone();
    interface.add_method("M")?.set_method_callback(Rc::new(move |_conn, details| {
        details.args.read_u32()?;
        log.borrow_mut().push("method");
        Ok(())
    }));
    conn.bind_interface("/", Rc::new(interface), None)?;

    let log = order.clone();
    conn.add_match(
        MatchRule::new().with_member("M"),
        Rc::new(move |_conn, message| {
            // The match sees the arguments from the start.
            let mut body = message.body();
            assert_eq!(body.read_u32()?, 77);
            log.borrow_mut().push("match");
            Ok(())
        }),
    )?;

    let mut call = Message::method_call(ObjectPath::ROOT, "M").with_interface("x.Y");
    call.body_buf().append_arguments(Signature::UINT32)?;
    call.body_buf().append_u32(77)?;
    deliver(&mut conn, call)?;

    assert_eq!(&*order.borrow(), &["method", "match"]);
    Ok(())
}

#[test]
fn one_shot_match_fires_once() -> Result<()> {
    let (mut conn, _sent) = connection_with_sink();

    let fired = Rc::new(RefCell::new(0));
    let count = fired.clone();

    conn.add_match(
        MatchRule::new().with_member("Once").one_shot(),
        Rc::new(move |_conn, _message| {
            *count.borrow_mut() += 1;
            Ok(())
        }),
    )?;

    let signal = conn.signal(ObjectPath::new("/s")?, "a.b", "Once");
    deliver(&mut conn, signal.clone())?;
    deliver(&mut conn, signal)?;

    assert_eq!(*fired.borrow(), 1);
    assert!(conn.matches.is_empty());
    Ok(())
}

#[test]
fn match_insertion_order() -> Result<()> {
    let (mut conn, _sent) = connection_with_sink();

    let order = Rc::new(RefCell::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let log = order.clone();
        conn.add_match(
            MatchRule::new().with_member("Sig"),
            Rc::new(move |_conn, _message| {
                log.borrow_mut().push(name);
                Ok(())
            }),
        )?;
    }

    deliver(&mut conn, Message::signal(ObjectPath::new("/s")?, "a.b", "Sig"))?;
    assert_eq!(&*order.borrow(), &["first", "second", "third"]);
    Ok(())
}

#[test]
fn service_name_tracking() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let fired = Rc::new(RefCell::new(0));
    let count = fired.clone();

    conn.add_match(
        MatchRule::new().with_sender("com.example").with_member("Sig"),
        Rc::new(move |_conn, _message| {
            *count.borrow_mut() += 1;
            Ok(())
        }),
    )?;

    // The connection subscribed to NameOwnerChanged and asked for the
    // current owner.
    let (owner_serial, owner_rule) = {
        let sent = sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].member(), Some("AddMatch"));

        let mut body = sent[0].body();
        let rule = body.read_str()?.to_owned();
        assert!(rule.contains("member='NameOwnerChanged'"));
        assert!(rule.contains("arg0='com.example'"));

        assert_eq!(sent[1].member(), Some("GetNameOwner"));
        (sent[1].serial().unwrap(), rule)
    };
    assert!(!owner_rule.is_empty());

    // Simulated GetNameOwner reply.
    let mut reply = Message::method_return(owner_serial).with_sender("org.freedesktop.DBus");
    reply.body_buf().append_arguments(Signature::STRING)?;
    reply.body_buf().append_str(":1.10")?;
    deliver(&mut conn, reply)?;

    let signal = |sender: &str| -> Result<Message> {
        Ok(Message::signal(ObjectPath::new("/s")?, "com.example", "Sig").with_sender(sender))
    };

    // Only the resolved unique name fires the match.
    deliver(&mut conn, signal(":1.10")?)?;
    assert_eq!(*fired.borrow(), 1);

    deliver(&mut conn, signal(":1.11")?)?;
    assert_eq!(*fired.borrow(), 1);

    // The well-known name itself does not fire it either.
    deliver(&mut conn, signal("com.example")?)?;
    assert_eq!(*fired.borrow(), 1);

    // Ownership moves to :1.20.
    let mut changed = Message::signal(
        ObjectPath::new("/org/freedesktop/DBus")?,
        "org.freedesktop.DBus",
        "NameOwnerChanged",
    )
    .with_sender("org.freedesktop.DBus");
    let body = changed.body_buf();
    body.append_arguments(Signature::new(b"sss")?)?;
    body.append_str("com.example")?;
    body.append_str(":1.10")?;
    body.append_str(":1.20")?;
    deliver(&mut conn, changed)?;

    deliver(&mut conn, signal(":1.20")?)?;
    assert_eq!(*fired.borrow(), 2);

    deliver(&mut conn, signal(":1.10")?)?;
    assert_eq!(*fired.borrow(), 2);
    Ok(())
}

#[test]
fn service_released_with_last_match() -> Result<()> {
    let (mut conn, _sent) = connection_with_sink();

    let id = conn.add_match(
        MatchRule::new().with_sender("com.example").with_member("Sig"),
        Rc::new(|_conn, _message| Ok(())),
    )?;

    assert!(conn.services.contains_key("com.example"));

    conn.remove_match(id)?;

    assert!(!conn.services.contains_key("com.example"));
    // The NameOwnerChanged tracking match went away with the service; only
    // the pending GetNameOwner reply handler remains.
    assert_eq!(conn.matches.len(), 1);
    Ok(())
}

#[test]
fn node_pruning() -> Result<()> {
    let (mut conn, _sent) = connection_with_sink();

    let interface = Rc::new(Interface::new("a.b")?);

    conn.bind_interface("/a/b", interface.clone(), None)?;
    assert!(conn.has_object("/a/b"));
    assert!(conn.has_object("/a"));
    assert!(conn.has_object("/"));

    conn.unbind_interface("/a/b", &interface)?;
    assert!(!conn.has_object("/a/b"));
    assert!(!conn.has_object("/a"));

    // A node with children is retained when its own binding goes away.
    let parent = Rc::new(Interface::new("c.d")?);
    conn.bind_interface("/a/b", interface.clone(), None)?;
    conn.bind_interface("/a", parent.clone(), None)?;
    conn.unbind_interface("/a", &parent)?;
    assert!(conn.has_object("/a"));
    assert!(conn.has_object("/a/b"));

    // get_object after pruning returns a fresh node with only built-ins.
    conn.unbind_interface("/a/b", &interface)?;
    let path = conn.get_object("/a/b")?;
    assert!(conn.objects[&path].interfaces.is_empty());
    Ok(())
}

#[test]
fn path_canonicalization_on_lookup() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let mut interface = Interface::new("x.Y")?;
    interface.add_method("M")?.set_method_callback(Rc::new(|_conn, _details| Ok(())));

    // Binding with a messy path lands on the canonical node.
    conn.bind_interface("//a//b/", Rc::new(interface), None)?;
    assert!(conn.has_object("/a/b"));

    let call = Message::method_call(ObjectPath::new("/a/b")?, "M").with_interface("x.Y");
    deliver(&mut conn, call)?;

    assert!(matches!(
        sent.borrow()[0].kind(),
        MessageKind::MethodReturn { .. }
    ));
    Ok(())
}

#[test]
fn serial_and_match_id_wrap_around_zero() {
    let mut conn = Connection::new();

    conn.serial = u32::MAX;
    assert_eq!(conn.next_serial().get(), 1);

    conn.match_id = u32::MAX;
    assert_eq!(conn.next_match_id().get(), 1);
    // The serial counter is untouched by the match id wrap.
    assert_eq!(conn.next_serial().get(), 2);
}

#[test]
fn caller_supplied_match_id() -> Result<()> {
    let (mut conn, _sent) = connection_with_sink();

    let id = NonZeroU32::new(77).unwrap();
    let assigned = conn.add_match(
        MatchRule::new().with_member("Sig").with_id(id),
        Rc::new(|_conn, _message| Ok(())),
    )?;

    assert_eq!(assigned, id);
    conn.remove_match(id)?;
    assert!(conn.matches.is_empty());
    Ok(())
}

#[test]
fn add_match_notifies_daemon() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let id = conn.add_match(
        MatchRule::new()
            .with_message_type(MessageType::SIGNAL)
            .with_member("Sig")
            .add_to_bus_daemon(),
        Rc::new(|_conn, _message| Ok(())),
    )?;

    conn.remove_match(id)?;

    let sent = sent.borrow();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].member(), Some("AddMatch"));
    assert_eq!(sent[1].member(), Some("RemoveMatch"));

    let mut body = sent[0].body();
    assert_eq!(body.read_str()?, "type='signal',member='Sig'");
    Ok(())
}

#[test]
fn connect_to_bus() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    conn.connect_to_bus()?;
    assert!(!conn.is_connected());

    let hello_serial = {
        let sent = sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].member(), Some("Hello"));
        assert_eq!(sent[0].destination(), Some("org.freedesktop.DBus"));
        sent[0].serial().unwrap()
    };

    let mut reply = Message::method_return(hello_serial).with_sender("org.freedesktop.DBus");
    reply.body_buf().append_arguments(Signature::STRING)?;
    reply.body_buf().append_str(":1.42")?;
    deliver(&mut conn, reply)?;

    assert!(conn.is_connected());
    assert_eq!(conn.unique_name(), Some(":1.42"));
    Ok(())
}

#[test]
fn request_name_typed_reply() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();

    conn.request_name(
        "com.example.Service",
        NameFlag::DO_NOT_QUEUE,
        Some(Rc::new(move |_conn, result| {
            *slot.borrow_mut() = Some(result);
            Ok(())
        })),
    )?;

    let serial = {
        let sent = sent.borrow();
        assert_eq!(sent[0].member(), Some("RequestName"));

        let mut body = sent[0].body();
        assert_eq!(body.read_str()?, "com.example.Service");
        assert_eq!(body.read_u32()?, 4);
        sent[0].serial().unwrap()
    };

    let mut reply = Message::method_return(serial).with_sender("org.freedesktop.DBus");
    reply.body_buf().append_arguments(Signature::UINT32)?;
    reply.body_buf().append_u32(1)?;
    deliver(&mut conn, reply)?;

    let outcome = outcome.borrow_mut().take().expect("a result");
    assert_eq!(outcome.ok(), Some(NameReply::PRIMARY_OWNER));
    Ok(())
}

#[test]
fn request_name_bus_error() -> Result<()> {
    let (mut conn, sent) = connection_with_sink();

    let outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();

    conn.request_name(
        "com.example.Service",
        NameFlag::default(),
        Some(Rc::new(move |_conn, result| {
            *slot.borrow_mut() = Some(result);
            Ok(())
        })),
    )?;

    let serial = sent.borrow()[0].serial().unwrap();

    let reply = Message::error("org.freedesktop.DBus.Error.AccessDenied", serial)
        .with_sender("org.freedesktop.DBus");
    deliver(&mut conn, reply)?;

    let outcome = outcome.borrow_mut().take().expect("a result");
    assert!(outcome.is_err());
    Ok(())
}

#[test]
fn reentrant_match_registration() -> Result<()> {
    let (mut conn, _sent) = connection_with_sink();

    let fired = Rc::new(RefCell::new(0));
    let count = fired.clone();

    conn.add_match(
        MatchRule::new().with_member("Sig").one_shot(),
        Rc::new(move |conn, _message| {
            // Callbacks may install further matches while the scan runs.
            let count = count.clone();
            conn.add_match(
                MatchRule::new().with_member("Other"),
                Rc::new(move |_conn, _message| {
                    *count.borrow_mut() += 1;
                    Ok(())
                }),
            )?;
            Ok(())
        }),
    )?;

    deliver(&mut conn, Message::signal(ObjectPath::new("/s")?, "a.b", "Sig"))?;
    deliver(&mut conn, Message::signal(ObjectPath::new("/s")?, "a.b", "Other"))?;

    assert_eq!(*fired.borrow(), 1);
    Ok(())
}
