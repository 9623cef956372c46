use sip_registrar::{
    Aor, ContactEntry, DbImplementation, MemoryKvStore, Record, RegisterRequest, RegistrarConfig,
    RegistrarDb, RegistrarError, RegistrarListener, RemoteStores,
};
use std::sync::{Arc, Mutex};

const T0: i64 = 1_700_000_000;

#[derive(Default)]
struct Recorder {
    found: Mutex<Vec<Option<Vec<String>>>>,
    errors: Mutex<Vec<String>>,
    invalid: Mutex<Vec<String>>,
}

impl Recorder {
    fn total(&self) -> usize {
        self.found.lock().unwrap().len()
            + self.errors.lock().unwrap().len()
            + self.invalid.lock().unwrap().len()
    }
}

impl RegistrarListener for Recorder {
    fn on_record_found(&self, record: Option<&Record>) {
        let contacts = record.map(|r| r.contacts().iter().map(|c| c.sip_uri().to_string()).collect());
        self.found.lock().unwrap().push(contacts);
    }

    fn on_error(&self, error: &RegistrarError) {
        self.errors.lock().unwrap().push(error.error_code().to_string());
    }

    fn on_invalid(&self, error: &RegistrarError) {
        self.invalid.lock().unwrap().push(error.error_code().to_string());
    }
}

fn register(user: &str, call_id: &str, cseq: u32, contacts: &[&str]) -> RegisterRequest {
    let mut request = RegisterRequest::new(Aor::new(user, "example.com"), call_id, cseq);
    for c in contacts {
        request = request.with_contact(ContactEntry::parse(c).unwrap());
    }
    request
}

fn all_kinds(max_contacts: usize) -> Vec<(RegistrarDb, Arc<MemoryKvStore>)> {
    [
        DbImplementation::Internal,
        DbImplementation::RedisSync,
        DbImplementation::RedisAsync,
    ]
    .into_iter()
    .map(|kind| {
        let store = Arc::new(MemoryKvStore::new());
        let config = RegistrarConfig::new(kind, max_contacts);
        let db = RegistrarDb::new(&config, RemoteStores::memory(store.clone())).unwrap();
        (db, store)
    })
    .collect()
}

#[tokio::test]
async fn test_alice_contact_lifecycle() {
    for (db, _) in all_kinds(5) {
        let alice = Aor::new("alice", "example.com");
        db.bind_record_at(
            register("alice", "a1", 1, &["sip:alice@192.0.2.1:5060;q=1.0;expires=3600"]),
            None,
            3600,
            false,
            T0,
        )
        .await
        .unwrap();

        let record = db.fetch_record(&alice, false).await.unwrap().unwrap();
        assert_eq!(
            record.get_contacts(T0 + 100),
            vec!["sip:alice@192.0.2.1:5060;q=1.00;expires=3500".to_string()],
            "{}",
            db.kind()
        );
        assert!(record.get_contacts(T0 + 3700).is_empty());
    }
}

#[tokio::test]
async fn test_stale_cseq_leaves_record_unchanged() {
    for (db, _) in all_kinds(5) {
        let alice = Aor::new("alice", "example.com");
        db.bind_record_at(register("alice", "a1", 5, &["sip:alice@192.0.2.1"]), None, 3600, false, T0)
            .await
            .unwrap();

        for cseq in [5, 4] {
            let err = db
                .bind_record_at(
                    register("alice", "a1", cseq, &["sip:alice@192.0.2.99"]),
                    None,
                    3600,
                    false,
                    T0 + 1,
                )
                .await
                .unwrap_err();
            assert!(err.is_invalid());
            assert_eq!(err.error_code(), "STALE_REQUEST");
        }

        let record = db.fetch_record(&alice, false).await.unwrap().unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.contacts()[0].sip_uri(), "sip:alice@192.0.2.1");
        assert_eq!(record.contacts()[0].cseq(), 5);

        // 更大的 CSeq 替换同一 Call-ID 的绑定
        let record = db
            .bind_record_at(register("alice", "a1", 6, &["sip:alice@192.0.2.2"]), None, 3600, false, T0 + 2)
            .await
            .unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.contacts()[0].sip_uri(), "sip:alice@192.0.2.2");
    }
}

#[tokio::test]
async fn test_too_many_contacts_is_invalid() {
    for (db, _) in all_kinds(2) {
        let err = db
            .bind_record_at(
                register("bob", "b1", 1, &["sip:bob@h1", "sip:bob@h2", "sip:bob@h3"]),
                None,
                3600,
                false,
                T0,
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TOO_MANY_CONTACTS");
        assert!(db
            .fetch_record(&Aor::new("bob", "example.com"), false)
            .await
            .unwrap()
            .is_none());
    }
}

#[tokio::test]
async fn test_capacity_evicts_least_recently_updated() {
    for (db, _) in all_kinds(2) {
        let bob = Aor::new("bob", "example.com");
        db.bind_record_at(register("bob", "c1", 1, &["sip:bob@h1"]), None, 3600, false, T0)
            .await
            .unwrap();
        db.bind_record_at(register("bob", "c2", 1, &["sip:bob@h2"]), None, 3600, false, T0 + 10)
            .await
            .unwrap();
        let record = db
            .bind_record_at(register("bob", "c3", 1, &["sip:bob@h3"]), None, 3600, false, T0 + 20)
            .await
            .unwrap();

        assert_eq!(record.len(), 2);
        let uris: Vec<&str> = record.contacts().iter().map(|c| c.sip_uri()).collect();
        assert_eq!(uris, vec!["sip:bob@h2", "sip:bob@h3"]);

        let fetched = db.fetch_record(&bob, false).await.unwrap().unwrap();
        assert!(fetched.len() <= db.max_contacts());
    }
}

#[tokio::test]
async fn test_same_identity_is_replaced() {
    for (db, _) in all_kinds(5) {
        db.bind_record_at(
            register("carol", "c1", 1, &["sip:carol@192.0.2.7:5060;transport=udp;expires=60"]),
            None,
            3600,
            false,
            T0,
        )
        .await
        .unwrap();
        let record = db
            .bind_record_at(
                register("carol", "c2", 1, &["sip:carol@192.0.2.7:5060;transport=UDP;expires=600"]),
                None,
                3600,
                false,
                T0 + 30,
            )
            .await
            .unwrap();

        assert_eq!(record.len(), 1);
        assert_eq!(record.contacts()[0].expire_at(), T0 + 630);
        assert_eq!(record.contacts()[0].call_id(), "c2");
    }
}

#[tokio::test]
async fn test_recursive_fetch_follows_one_alias_level() {
    for (db, _) in all_kinds(5) {
        let now = sip_registrar::utils::unix_now();
        db.bind_record_at(register("alice", "a1", 1, &["sip:bob@example.com"]), None, 3600, true, now)
            .await
            .unwrap();
        db.bind_record_at(register("bob", "b1", 1, &["sip:bob@192.0.2.20:5060"]), None, 3600, false, now)
            .await
            .unwrap();

        let alice = Aor::new("alice", "example.com");
        let direct = db.fetch_record(&alice, false).await.unwrap().unwrap();
        assert!(direct.contacts()[0].is_alias());

        let resolved = db.fetch_record(&alice, true).await.unwrap().unwrap();
        assert_eq!(resolved.aor(), "alice@example.com");
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.contacts()[0].sip_uri(), "sip:bob@192.0.2.20:5060");
        assert!(!resolved.contacts()[0].is_alias());
    }
}

#[tokio::test]
async fn test_zero_recursion_depth_returns_alias() {
    let config = RegistrarConfig::new(DbImplementation::Internal, 5).with_max_recursion_depth(0);
    let db = RegistrarDb::new(&config, RemoteStores::none()).unwrap();
    db.bind_record(register("alice", "a1", 1, &["sip:bob@example.com"]), None, 3600, true)
        .await
        .unwrap();
    db.bind_record(register("bob", "b1", 1, &["sip:bob@192.0.2.20"]), None, 3600, false)
        .await
        .unwrap();

    let record = db
        .fetch_record(&Aor::new("alice", "example.com"), true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.len(), 1);
    assert_eq!(record.contacts()[0].sip_uri(), "sip:bob@example.com");
}

#[tokio::test]
async fn test_unreachable_store_reports_one_error() {
    for (db, store) in all_kinds(5).into_iter().skip(1) {
        store.set_unavailable(true);
        let recorder = Arc::new(Recorder::default());

        db.fetch(Aor::new("alice", "example.com"), recorder.clone(), true)
            .await
            .unwrap();
        db.bind(register("alice", "a1", 1, &["sip:alice@192.0.2.1"]), None, 3600, false, recorder.clone())
            .await
            .unwrap();

        assert_eq!(recorder.total(), 2);
        assert_eq!(
            *recorder.errors.lock().unwrap(),
            vec!["BACKEND_FAILURE".to_string(), "BACKEND_FAILURE".to_string()]
        );
    }
}

#[tokio::test]
async fn test_clear_removes_every_binding() {
    for (db, store) in all_kinds(5) {
        let recorder = Arc::new(Recorder::default());
        db.bind(
            register("erin", "e1", 1, &["sip:erin@h1", "sip:erin@h2"]),
            None,
            3600,
            false,
            recorder.clone(),
        )
        .await
        .unwrap();
        db.clear(register("erin", "e1", 2, &[]), recorder.clone())
            .await
            .unwrap();
        db.fetch(Aor::new("erin", "example.com"), recorder.clone(), false)
            .await
            .unwrap();

        let found = recorder.found.lock().unwrap().clone();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].as_ref().map(Vec::len), Some(2));
        assert_eq!(found[1], None);
        assert_eq!(found[2], None);
        if db.kind() != DbImplementation::Internal {
            assert!(store.is_empty());
        }
    }
}

#[tokio::test]
async fn test_malformed_remote_record_is_an_error() {
    let store = Arc::new(MemoryKvStore::new());
    let config = RegistrarConfig::new(DbImplementation::RedisAsync, 5);
    let db = RegistrarDb::new(&config, RemoteStores::memory(store.clone())).unwrap();
    store.insert_raw("mallory@example.com", "{not json");

    let err = db
        .fetch_record(&Aor::new("mallory", "example.com"), false)
        .await
        .unwrap_err();
    assert!(!err.is_invalid());
}
