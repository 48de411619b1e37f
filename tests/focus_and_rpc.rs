use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;

use serde_json::{Value, json};
use tempfile::TempDir;

use switchboard::Host;
use switchboard::model::config::AppConfig;
use switchboard::msg::Msg;
use switchboard::plugin::envelope::CompilationReport;
use switchboard::plugin::host_fns::{Completion, ConfigCapability};
use switchboard::plugin::{ChannelEndpoint, InboundMessage, PluginDescriptor, PluginId, Posted};

struct Session {
    host: Host,
    events: mpsc::Receiver<Msg>,
    posts: mpsc::Receiver<Posted>,
    _dir: TempDir,
}

impl Session {
    fn new(extra: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layer = format!(
            "[broker]\nconfig_root = {:?}\n{extra}",
            dir.path().display().to_string()
        );
        let config = AppConfig::from_layers(Some(&layer)).unwrap();

        let (tx, events) = mpsc::channel();
        let (post_tx, posts) = mpsc::channel();
        let host = Host::new(&config, tx, ChannelEndpoint::connector(post_tx)).unwrap();

        Self {
            host,
            events,
            posts,
            _dir: dir,
        }
    }

    fn send(&mut self, msg: Msg) {
        self.host.update(msg).unwrap();
        while let Ok(next) = self.events.try_recv() {
            self.host.update(next).unwrap();
        }
    }

    fn register(&mut self, title: &str) {
        let url = format!("https://{}.example/index.html", title.to_lowercase());
        self.send(Msg::Register(PluginDescriptor::new(title, url)));
    }

    fn tab(&mut self, tab: &str) {
        self.send(Msg::TabChanged(tab.into()));
    }

    fn inbound(&mut self, source: &str, origin: &str, data: Value) {
        self.send(Msg::Inbound(InboundMessage {
            source: PluginId::new(source),
            origin: origin.into(),
            data: data.to_string(),
        }));
    }

    /// Everything posted since the last call, as (plugin, parsed json).
    fn drain(&self) -> Vec<(String, Value)> {
        self.posts
            .try_iter()
            .map(|p| (p.to.to_string(), serde_json::from_str(&p.message).unwrap()))
            .collect()
    }

    fn drain_types(&self) -> Vec<(String, String)> {
        self.drain()
            .into_iter()
            .map(|(to, v)| (to, v["type"].as_str().unwrap_or_default().to_string()))
            .collect()
    }
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

type Calls = Rc<RefCell<Vec<(PluginId, Vec<String>, Completion)>>>;

/// Holds completions until the test fires them.
struct Deferred(Calls);

impl ConfigCapability for Deferred {
    fn set_config(&mut self, plugin: &PluginId, path: &str, content: &str, done: Completion) {
        self.0
            .borrow_mut()
            .push((plugin.clone(), vec![path.into(), content.into()], done));
    }

    fn get_config(&mut self, plugin: &PluginId, path: &str, done: Completion) {
        self.0.borrow_mut().push((plugin.clone(), vec![path.into()], done));
    }

    fn remove_config(&mut self, plugin: &PluginId, path: &str, done: Completion) {
        self.0.borrow_mut().push((plugin.clone(), vec![path.into()], done));
    }
}

fn with_deferred(session: &mut Session, namespace: &str) -> Calls {
    let calls: Calls = Rc::default();
    session
        .host
        .register_capability(namespace, Box::new(Deferred(calls.clone())))
        .unwrap();
    calls
}

#[test]
fn switching_focus_orders_unfocus_focus_compilation_data() {
    let mut s = Session::new("");
    s.register("A");
    s.register("B");

    s.tab("A");
    assert_eq!(s.drain_types(), pairs(&[("A", "focus"), ("A", "compilationData")]));

    s.tab("B");
    assert_eq!(
        s.drain_types(),
        pairs(&[("A", "unfocus"), ("B", "focus"), ("B", "compilationData")])
    );
}

#[test]
fn refocusing_the_focused_plugin_sends_nothing() {
    let mut s = Session::new("");
    s.register("A");
    s.tab("A");
    s.drain();

    s.tab("A");
    assert!(s.drain().is_empty());
}

#[test]
fn compilation_data_carries_latest_successful_result() {
    let mut s = Session::new("");
    s.register("A");
    s.register("B");

    s.tab("A");
    let posts = s.drain();
    assert_eq!(posts[1].1, json!({"type": "compilationData", "value": null}));

    s.send(Msg::CompilationFinished(CompilationReport {
        success: true,
        data: json!({"contracts": 1}),
        source: json!({"target": "a.sol"}),
    }));
    s.drain();

    s.tab("B");
    let posts = s.drain();
    assert_eq!(
        posts[2],
        (
            "B".to_string(),
            json!({
                "type": "compilationData",
                "value": {"data": {"contracts": 1}, "source": {"target": "a.sol"}}
            })
        )
    );
}

#[test]
fn compilation_finished_reaches_only_the_focused_plugin() {
    let mut s = Session::new("");
    s.register("A");
    s.register("B");
    let report = CompilationReport {
        success: false,
        data: json!({"errors": ["x"]}),
        source: json!(null),
    };

    s.send(Msg::CompilationFinished(report.clone()));
    assert!(s.drain().is_empty());

    s.tab("B");
    s.drain();
    s.send(Msg::CompilationFinished(report));
    assert_eq!(
        s.drain(),
        vec![(
            "B".to_string(),
            json!({
                "type": "compilationFinished",
                "value": {"success": false, "data": {"errors": ["x"]}, "source": null}
            })
        )]
    );

    s.tab("settings");
    s.drain();
    s.send(Msg::CompilationFinished(CompilationReport {
        success: true,
        data: json!({}),
        source: json!({}),
    }));
    assert!(s.drain().is_empty());
}

#[test]
fn set_config_scenario_round_trips_through_the_broker() {
    let mut s = Session::new("");
    let calls = with_deferred(&mut s, "testManager");
    s.register("P1");
    s.tab("P1");
    s.drain();

    s.inbound(
        "P1",
        "https://p1.example",
        json!({"type": "setConfig", "arguments": ["x.txt", "1"], "id": 7, "key": "testManager"}),
    );

    let (plugin, args, done) = calls.borrow_mut().pop().unwrap();
    assert_eq!(plugin, PluginId::new("P1"));
    assert_eq!(args, vec!["x.txt".to_string(), "1".to_string()]);
    assert!(s.drain().is_empty());

    done.complete(Ok(json!("ok")));
    s.send(Msg::Quit);
    assert_eq!(
        s.drain(),
        vec![(
            "P1".to_string(),
            json!({"id": 7, "type": "setConfig", "error": null, "result": "ok"})
        )]
    );
}

#[test]
fn built_in_file_manager_stores_per_plugin_configs() {
    let mut s = Session::new("");
    s.register("P1");
    s.tab("P1");
    s.drain();

    s.inbound(
        "P1",
        "https://p1.example",
        json!({"type": "setConfig", "arguments": ["a.txt", "contents"], "id": 1, "key": "fileManager"}),
    );
    s.inbound(
        "P1",
        "https://p1.example",
        json!({"type": "getConfig", "arguments": ["a.txt"], "id": 2, "key": "fileManager"}),
    );
    s.inbound(
        "P1",
        "https://p1.example",
        json!({"type": "removeConfig", "arguments": ["a.txt"], "id": 3, "key": "fileManager"}),
    );
    s.inbound(
        "P1",
        "https://p1.example",
        json!({"type": "getConfig", "arguments": ["a.txt"], "id": 4, "key": "fileManager"}),
    );

    let responses: Vec<Value> = s.drain().into_iter().map(|(_, v)| v).collect();
    assert_eq!(
        responses,
        vec![
            json!({"id": 1, "type": "setConfig", "error": null, "result": null}),
            json!({"id": 2, "type": "getConfig", "error": null, "result": "contents"}),
            json!({"id": 3, "type": "removeConfig", "error": null, "result": null}),
            json!({"id": 4, "type": "getConfig", "error": "config not found: a.txt", "result": null}),
        ]
    );
}

#[test]
fn origin_mismatch_yields_no_call_and_no_response() {
    let mut s = Session::new("");
    let calls = with_deferred(&mut s, "testManager");
    s.register("P1");
    s.tab("P1");
    s.drain();

    let request = json!({"type": "getConfig", "arguments": ["a"], "id": 1, "key": "testManager"});
    s.inbound("P1", "https://attacker.example", request.clone());
    s.inbound("P1", "https://p1.example/index.html", request.clone());
    s.inbound("P1", "http://p1.example", request);

    assert!(calls.borrow().is_empty());
    assert!(s.drain().is_empty());
}

#[test]
fn operations_outside_allow_list_are_ignored() {
    let mut s = Session::new("");
    let calls = with_deferred(&mut s, "testManager");
    s.register("P1");
    s.tab("P1");
    s.drain();

    for kind in ["readFile", "constructor", "__proto__", "setconfig"] {
        s.inbound(
            "P1",
            "https://p1.example",
            json!({"type": kind, "arguments": [], "id": 1, "key": "testManager"}),
        );
    }
    s.send(Msg::Inbound(InboundMessage {
        source: PluginId::new("P1"),
        origin: "https://p1.example".into(),
        data: "][".into(),
    }));

    assert!(calls.borrow().is_empty());
    assert!(s.drain().is_empty());
    assert_eq!(s.host.broker().pending_count(), 0);
}

#[test]
fn unfocused_plugins_cannot_call_the_host() {
    let mut s = Session::new("");
    let calls = with_deferred(&mut s, "testManager");
    s.register("P1");
    s.register("P2");
    let request = json!({"type": "getConfig", "arguments": ["a"], "id": 1, "key": "testManager"});

    s.inbound("P1", "https://p1.example", request.clone());
    s.tab("P2");
    s.drain();
    s.inbound("P1", "https://p1.example", request);

    assert!(calls.borrow().is_empty());
    assert!(s.drain().is_empty());
}

#[test]
fn unknown_namespace_answers_with_error() {
    let mut s = Session::new("");
    s.register("P1");
    s.tab("P1");
    s.drain();

    s.inbound(
        "P1",
        "https://p1.example",
        json!({"type": "getConfig", "arguments": ["a"], "id": "q", "key": "nowhere"}),
    );

    assert_eq!(
        s.drain(),
        vec![(
            "P1".to_string(),
            json!({
                "id": "q",
                "type": "getConfig",
                "error": "unknown capability namespace: \"nowhere\"",
                "result": null
            })
        )]
    );
}

#[test]
fn slow_response_goes_to_requester_by_default() {
    let mut s = Session::new("");
    let calls = with_deferred(&mut s, "testManager");
    s.register("P1");
    s.register("P2");
    s.tab("P1");
    s.inbound(
        "P1",
        "https://p1.example",
        json!({"type": "getConfig", "arguments": ["a"], "id": 1, "key": "testManager"}),
    );
    s.tab("P2");
    s.drain();

    let (_, _, done) = calls.borrow_mut().pop().unwrap();
    done.complete(Ok(json!("late")));
    s.send(Msg::Quit);

    assert_eq!(
        s.drain(),
        vec![(
            "P1".to_string(),
            json!({"id": 1, "type": "getConfig", "error": null, "result": "late"})
        )]
    );
}

#[test]
fn focused_routing_follows_focus_at_completion_time() {
    let mut s = Session::new("response_routing = \"focused\"\n");
    let calls = with_deferred(&mut s, "testManager");
    s.register("P1");
    s.register("P2");
    s.tab("P1");
    s.inbound(
        "P1",
        "https://p1.example",
        json!({"type": "getConfig", "arguments": ["a"], "id": 1, "key": "testManager"}),
    );
    s.tab("P2");
    s.drain();

    let (_, _, done) = calls.borrow_mut().pop().unwrap();
    done.complete(Ok(json!("late")));
    s.send(Msg::Quit);

    assert_eq!(s.drain()[0].0, "P2");
}

#[test]
fn capability_errors_are_delivered_verbatim() {
    let mut s = Session::new("");
    let calls = with_deferred(&mut s, "testManager");
    s.register("P1");
    s.tab("P1");
    s.drain();
    s.inbound(
        "P1",
        "https://p1.example",
        json!({"type": "removeConfig", "arguments": ["a"], "id": 9, "key": "testManager"}),
    );

    let (_, _, done) = calls.borrow_mut().pop().unwrap();
    done.complete(Err(switchboard::plugin::host_fns::CapabilityError::Failed(
        "disk full".into(),
    )));
    s.send(Msg::Quit);

    assert_eq!(
        s.drain(),
        vec![(
            "P1".to_string(),
            json!({"id": 9, "type": "removeConfig", "error": "disk full", "result": null})
        )]
    );
}

#[test]
fn unregistering_the_focused_plugin_clears_focus_silently() {
    let mut s = Session::new("");
    s.register("P1");
    s.register("P2");
    s.tab("P1");
    s.drain();

    s.send(Msg::Unregister(PluginId::new("P1")));
    assert!(s.host.focus().focused().is_none());

    s.tab("P2");
    assert_eq!(s.drain_types(), pairs(&[("P2", "focus"), ("P2", "compilationData")]));
}

#[test]
fn plugins_from_config_are_registered_at_startup() {
    let s = Session::new(
        "\n[[plugins]]\ntitle = \"Debugger\"\nurl = \"https://dbg.example/ui\"\n\n[[plugins]]\ntitle = \"Off\"\nurl = \"https://off.example\"\nenabled = false\n",
    );

    let record = s.host.registry().lookup("Debugger").unwrap();
    assert_eq!(record.trusted_origin, "https://dbg.example");
    assert!(s.host.registry().lookup("Off").is_none());
}

#[test]
fn sessions_are_independent() {
    let mut a = Session::new("");
    let mut b = Session::new("");
    a.register("P1");
    b.register("P1");

    a.tab("P1");
    assert!(a.host.focus().is_focused("P1"));
    assert!(b.host.focus().focused().is_none());
    assert!(b.drain().is_empty());
}

#[test]
fn re_registering_the_focused_plugin_moves_its_trusted_origin() {
    let mut s = Session::new("");
    let calls = with_deferred(&mut s, "testManager");
    s.register("P1");
    s.tab("P1");
    s.drain();

    s.send(Msg::Register(PluginDescriptor::new(
        "P1",
        "https://p1-moved.example:8443/ui",
    )));
    assert!(s.host.focus().is_focused("P1"));

    let request = json!({"type": "getConfig", "arguments": ["a"], "id": 1, "key": "testManager"});
    s.inbound("P1", "https://p1.example", request.clone());
    assert!(calls.borrow().is_empty());

    s.inbound("P1", "https://p1-moved.example:8443", request);
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn structured_request_ids_are_echoed_unchanged() {
    let mut s = Session::new("");
    s.register("P1");
    s.tab("P1");
    s.drain();

    let ids = [
        json!({"seq": 3, "tags": ["a", {"b": null}]}),
        json!([1, "two", [3.5], false]),
        json!(null),
    ];
    for id in &ids {
        s.inbound(
            "P1",
            "https://p1.example",
            json!({"type": "getConfig", "arguments": ["missing.txt"], "id": id, "key": "fileManager"}),
        );
    }

    let echoed: Vec<Value> = s.drain().into_iter().map(|(_, v)| v["id"].clone()).collect();
    assert_eq!(echoed, ids.to_vec());
}

/// Accepts every call and drops its completion.
struct Discarding;

impl ConfigCapability for Discarding {
    fn set_config(&mut self, _: &PluginId, _: &str, _: &str, _done: Completion) {}

    fn get_config(&mut self, _: &PluginId, _: &str, _done: Completion) {}

    fn remove_config(&mut self, _: &PluginId, _: &str, _done: Completion) {}
}

#[test]
fn dropped_completions_do_not_leak_pending_calls() {
    let mut s = Session::new("");
    s.host.register_capability("sink", Box::new(Discarding)).unwrap();
    s.register("P1");
    s.tab("P1");
    s.drain();

    for id in 0..1000 {
        s.inbound(
            "P1",
            "https://p1.example",
            json!({"type": "setConfig", "arguments": ["x.txt", "1"], "id": id, "key": "sink"}),
        );
    }

    assert_eq!(s.host.broker().pending_count(), 0);
    assert!(s.drain().is_empty());
}

#[test]
fn plugins_with_similar_ids_keep_separate_configs() {
    let plugins = [
        ("a b", "https://spaced.example"),
        ("a_b", "https://underscored.example"),
    ];
    let mut s = Session::new("");
    for (id, origin) in plugins {
        s.send(Msg::Register(PluginDescriptor::new(id, origin)));
    }

    for (id, origin) in plugins {
        s.tab(id);
        s.inbound(
            id,
            origin,
            json!({"type": "setConfig", "arguments": ["settings.json", id], "id": 1, "key": "fileManager"}),
        );
    }
    for (id, origin) in plugins {
        s.tab(id);
        s.drain();
        s.inbound(
            id,
            origin,
            json!({"type": "getConfig", "arguments": ["settings.json"], "id": 2, "key": "fileManager"}),
        );
        assert_eq!(
            s.drain(),
            vec![(
                id.to_string(),
                json!({"id": 2, "type": "getConfig", "error": null, "result": id})
            )]
        );
    }
}
