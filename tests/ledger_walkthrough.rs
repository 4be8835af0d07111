use std::sync::Arc;

use hashledger::blockchain::crypto::{public_key_from_pem, public_key_to_pem, verify_signature};
use hashledger::blockchain::LinkStatus;
use hashledger::{Block, Blockchain, Payload, SharedRecord, Transaction, TransactionError, Wallet};

#[test]
fn chain_walkthrough_detects_both_tampers() {
    let mut chain = Blockchain::new("I am root");
    let root = Arc::clone(chain.genesis());

    let b1 = chain.branch(b"I am a child.", &root).unwrap();
    let b2 = chain.branch("I am B1s brother", &root).unwrap();
    let b3 = chain.branch(12354i64, &b1).unwrap();

    let greeting: SharedRecord = [("text", "Hi there!")].into_iter().collect();
    greeting.set("num", 328965i64);
    let b4 = chain.branch(greeting.clone(), &b3).unwrap();
    let b5 = chain.branch("Top block", &b4).unwrap();

    for block in [&b1, &b2, &b3, &b4, &b5] {
        assert!(block.verify_link());
    }

    b3.set_payload(12345i64);
    assert!(!b4.verify_link());
    assert!(b5.verify_link());
    assert!(!b5.verify_ancestry());

    greeting.set("num", 99999i64);
    assert!(!b5.verify_link());

    let report = chain.verify();
    let broken: Vec<usize> = report.broken().map(|link| link.index).collect();
    // b4 and b5 sit at positions 4 and 5
    assert_eq!(broken, vec![4, 5]);
    assert_eq!(report.links[0].status, LinkStatus::Root);
}

#[test]
fn signed_transaction_as_block_payload() {
    let alice = Wallet::new();
    let bob = Wallet::new();
    let carol = Wallet::new();

    let mut tx = Transaction::new();
    tx.add_input(alice.address().clone(), 4).unwrap();
    tx.add_input(bob.address().clone(), 6).unwrap();
    tx.add_output(carol.address().clone(), 10).unwrap();
    tx.add_reqd(alice.address().clone()).unwrap();
    tx.add_reqd(bob.address().clone()).unwrap();

    assert!(!tx.is_valid());
    tx.sign(&alice).unwrap();
    assert!(!tx.is_valid());
    let partial = tx.clone();
    assert!(matches!(
        tx.sign(&carol),
        Err(TransactionError::UnauthorizedSigner(_))
    ));
    tx.sign(&bob).unwrap();
    assert!(tx.is_valid());

    let mut chain = Blockchain::new("genesis");
    let block = chain.append(tx);
    let top = chain.append("after");
    assert!(chain.verify().is_valid());

    // Swapping in the copy bob never signed is tampering
    block.set_payload(partial);
    assert!(!top.verify_link());

    let payload = block.payload();
    match &*payload {
        Payload::Transaction(tx) => {
            assert!(!tx.is_valid());
            assert_eq!(tx.missing_signers(), vec![bob.address()]);
        }
        other => panic!("unexpected payload {}", other.kind()),
    };
}

#[test]
fn keys_survive_pem_round_trip() {
    let wallet = Wallet::new();
    let restored = Wallet::from_pem(&wallet.to_pem().unwrap()).unwrap();
    let public = public_key_from_pem(&public_key_to_pem(wallet.public_key()).unwrap()).unwrap();

    let message = b"This is a secret message";
    assert!(verify_signature(message, &restored.sign(message), &public));
    assert!(verify_signature(message, &wallet.sign(message), restored.public_key()));
}

#[test]
fn detached_blocks_verify_without_a_chain() {
    let root = Block::root("I am root");
    let child = Block::new("child", Some(&root));
    let report = hashledger::blockchain::verify_chain(&[root, child]);
    assert!(report.is_valid());
}
