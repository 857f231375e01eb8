//! Registry of live peers.
//!
//! Peers are indexed by session id and, per role, by node address. One
//! lock covers all four maps so registration and removal are atomic across
//! them.

use {
    crate::{
        error::{P2pError, Result},
        msg::ConnType,
        peer::{start_broadcast, Peer},
    },
    log::*,
    parking_lot::RwLock,
    ranger_primitives::{Address, Hash},
    std::{collections::HashMap, sync::Arc},
};

/// Admission check applied to peers of one role before registration.
pub trait PeerValidator: Send + Sync {
    fn validate(&self, peer: &dyn Peer) -> Result<()>;
}

/// Accepts every peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl PeerValidator for NoopValidator {
    fn validate(&self, _peer: &dyn Peer) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct PeerSetState {
    peers: HashMap<String, Arc<dyn Peer>>,
    cn_peers: HashMap<Address, Arc<dyn Peer>>,
    pn_peers: HashMap<Address, Arc<dyn Peer>>,
    en_peers: HashMap<Address, Arc<dyn Peer>>,
    closed: bool,
}

impl PeerSetState {
    fn role_map(&self, conn_type: ConnType) -> &HashMap<Address, Arc<dyn Peer>> {
        match conn_type {
            ConnType::ConsensusNode => &self.cn_peers,
            ConnType::ProxyNode => &self.pn_peers,
            ConnType::EndpointNode => &self.en_peers,
        }
    }

    fn role_map_mut(&mut self, conn_type: ConnType) -> &mut HashMap<Address, Arc<dyn Peer>> {
        match conn_type {
            ConnType::ConsensusNode => &mut self.cn_peers,
            ConnType::ProxyNode => &mut self.pn_peers,
            ConnType::EndpointNode => &mut self.en_peers,
        }
    }
}

pub struct PeerSet {
    state: RwLock<PeerSetState>,
    validators: HashMap<ConnType, Arc<dyn PeerValidator>>,
    max_peers: usize,
}

impl PeerSet {
    pub fn new(max_peers: usize) -> Self {
        Self {
            state: RwLock::default(),
            validators: HashMap::new(),
            max_peers,
        }
    }

    pub fn with_validator(
        mut self,
        conn_type: ConnType,
        validator: Arc<dyn PeerValidator>,
    ) -> Self {
        self.validators.insert(conn_type, validator);
        self
    }

    /// Add `peer` and start its broadcast loop. Must be called from within
    /// a tokio runtime.
    pub fn register(&self, peer: Arc<dyn Peer>) -> Result<()> {
        let base = peer.base();
        if let Some(validator) = self.validators.get(&base.conn_type()) {
            validator.validate(peer.as_ref())?;
        }
        {
            let mut state = self.state.write();
            if state.closed {
                return Err(P2pError::Closed);
            }
            if state.peers.contains_key(base.id())
                || state.role_map(base.conn_type()).contains_key(base.address())
            {
                return Err(P2pError::AlreadyRegistered);
            }
            if state.peers.len() >= self.max_peers {
                return Err(P2pError::TooManyPeers(self.max_peers));
            }
            state.peers.insert(base.id().to_string(), peer.clone());
            state
                .role_map_mut(base.conn_type())
                .insert(*base.address(), peer.clone());
        }
        info!(
            "registered {:?} peer {} ({})",
            base.conn_type(),
            base.id(),
            base.address()
        );
        start_broadcast(peer);
        Ok(())
    }

    /// Remove the peer with session `id` and close it.
    pub fn unregister(&self, id: &str) -> Result<Arc<dyn Peer>> {
        let peer = {
            let mut state = self.state.write();
            let peer = state.peers.remove(id).ok_or(P2pError::NotRegistered)?;
            let base = peer.base();
            let role_map = state.role_map_mut(base.conn_type());
            if role_map
                .get(base.address())
                .is_some_and(|registered| registered.base().id() == id)
            {
                role_map.remove(base.address());
            }
            peer
        };
        peer.close();
        info!("unregistered peer {id}");
        Ok(peer)
    }

    pub fn peer(&self, id: &str) -> Option<Arc<dyn Peer>> {
        self.state.read().peers.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().peers.is_empty()
    }

    pub fn typed_len(&self, conn_type: ConnType) -> usize {
        self.state.read().role_map(conn_type).len()
    }

    pub fn peers(&self) -> Vec<Arc<dyn Peer>> {
        sorted(self.state.read().peers.values(), |_| true)
    }

    pub fn typed_peers(&self, conn_type: ConnType) -> Vec<Arc<dyn Peer>> {
        sorted(self.state.read().role_map(conn_type).values(), |_| true)
    }

    pub fn peers_without_tx(&self, hash: &Hash) -> Vec<Arc<dyn Peer>> {
        sorted(self.state.read().peers.values(), |peer| {
            !peer.base().knows_transaction(hash)
        })
    }

    pub fn peers_without_block(&self, hash: &Hash) -> Vec<Arc<dyn Peer>> {
        sorted(self.state.read().peers.values(), |peer| {
            !peer.base().knows_block(hash)
        })
    }

    pub fn typed_peers_without_tx(&self, conn_type: ConnType, hash: &Hash) -> Vec<Arc<dyn Peer>> {
        sorted(self.state.read().role_map(conn_type).values(), |peer| {
            !peer.base().knows_transaction(hash)
        })
    }

    pub fn typed_peers_without_block(
        &self,
        conn_type: ConnType,
        hash: &Hash,
    ) -> Vec<Arc<dyn Peer>> {
        sorted(self.state.read().role_map(conn_type).values(), |peer| {
            !peer.base().knows_block(hash)
        })
    }

    /// Peers of every role except `exclude` that have not seen the transaction.
    pub fn another_type_peers_without_tx(
        &self,
        exclude: ConnType,
        hash: &Hash,
    ) -> Vec<Arc<dyn Peer>> {
        sorted(self.state.read().peers.values(), |peer| {
            peer.base().conn_type() != exclude && !peer.base().knows_transaction(hash)
        })
    }

    pub fn another_type_peers_without_block(
        &self,
        exclude: ConnType,
        hash: &Hash,
    ) -> Vec<Arc<dyn Peer>> {
        sorted(self.state.read().peers.values(), |peer| {
            peer.base().conn_type() != exclude && !peer.base().knows_block(hash)
        })
    }

    /// The peer with the highest total score; ties go to the lowest id.
    pub fn best_peer(&self) -> Option<Arc<dyn Peer>> {
        let state = self.state.read();
        let mut best: Option<&Arc<dyn Peer>> = None;
        for peer in state.peers.values() {
            let better = match best {
                None => true,
                Some(current) => {
                    let (score, current_score) =
                        (peer.base().total_score(), current.base().total_score());
                    score > current_score
                        || (score == current_score && peer.base().id() < current.base().id())
                }
            };
            if better {
                best = Some(peer);
            }
        }
        best.cloned()
    }

    /// Close every peer and refuse further registrations.
    pub fn close(&self) {
        let mut state = self.state.write();
        for peer in state.peers.values() {
            peer.close();
        }
        state.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }
}

fn sorted<'a>(
    peers: impl Iterator<Item = &'a Arc<dyn Peer>>,
    filter: impl Fn(&Arc<dyn Peer>) -> bool,
) -> Vec<Arc<dyn Peer>> {
    let mut peers: Vec<Arc<dyn Peer>> = peers.filter(|peer| filter(peer)).cloned().collect();
    peers.sort_by(|a, b| a.base().id().cmp(b.base().id()));
    peers
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            config::P2pConfig,
            msg::PROTOCOL_VERSION,
            peer::{new_peer, BasePeer},
            transport::channel_pair,
        },
        assert_matches::assert_matches,
        num_bigint::BigUint,
    };

    fn peer(id: &str, addr: u8, conn_type: ConnType) -> Arc<dyn Peer> {
        let base = BasePeer::new(
            id,
            Address::new([addr; 20]),
            conn_type,
            PROTOCOL_VERSION,
            &P2pConfig::dev_default(),
        );
        let (local, _remote) = channel_pair(1024);
        new_peer(base, vec![local]).0
    }

    struct DenyAddress(Address);

    impl PeerValidator for DenyAddress {
        fn validate(&self, peer: &dyn Peer) -> Result<()> {
            if *peer.base().address() == self.0 {
                return Err(P2pError::Rejected(format!("{} is not a validator", self.0)));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_registration_rules() {
        let set = PeerSet::new(3);
        set.register(peer("a", 1, ConnType::ConsensusNode)).unwrap();
        assert_matches!(
            set.register(peer("a", 2, ConnType::ProxyNode)),
            Err(P2pError::AlreadyRegistered)
        );
        assert_matches!(
            set.register(peer("b", 1, ConnType::ConsensusNode)),
            Err(P2pError::AlreadyRegistered)
        );
        // Same address under another role is a different slot.
        set.register(peer("b", 1, ConnType::EndpointNode)).unwrap();
        set.register(peer("c", 3, ConnType::ProxyNode)).unwrap();
        assert_matches!(
            set.register(peer("d", 4, ConnType::ProxyNode)),
            Err(P2pError::TooManyPeers(3))
        );
        assert_eq!(set.len(), 3);
        assert_eq!(set.typed_len(ConnType::ConsensusNode), 1);

        let removed = set.unregister("a").unwrap();
        assert!(removed.base().is_closed());
        assert_matches!(set.unregister("a"), Err(P2pError::NotRegistered));
        assert_eq!(set.typed_len(ConnType::ConsensusNode), 0);

        set.close();
        assert!(set.peer("b").unwrap().base().is_closed());
        assert_matches!(
            set.register(peer("e", 5, ConnType::ProxyNode)),
            Err(P2pError::Closed)
        );
    }

    #[tokio::test]
    async fn test_validator_applies_to_its_role_only() {
        let banned = Address::new([7; 20]);
        let set = PeerSet::new(10)
            .with_validator(ConnType::ConsensusNode, Arc::new(DenyAddress(banned)));
        assert_matches!(
            set.register(peer("a", 7, ConnType::ConsensusNode)),
            Err(P2pError::Rejected(_))
        );
        set.register(peer("b", 7, ConnType::ProxyNode)).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_best_peer_tie_breaks_to_lowest_id() {
        let set = PeerSet::new(10);
        assert!(set.best_peer().is_none());
        for (id, addr, score) in [("c", 1, 5u8), ("a", 2, 9), ("b", 3, 9)] {
            let peer = peer(id, addr, ConnType::ProxyNode);
            peer.base().set_head(Hash::default(), BigUint::from(score));
            set.register(peer).unwrap();
        }
        for _ in 0..10 {
            assert_eq!(set.best_peer().unwrap().id(), "a");
        }
        set.peer("b")
            .unwrap()
            .base()
            .set_head(Hash::default(), BigUint::from(10u8));
        assert_eq!(set.best_peer().unwrap().id(), "b");
    }

    #[tokio::test]
    async fn test_without_queries() {
        let set = PeerSet::new(10);
        set.register(peer("cn", 1, ConnType::ConsensusNode)).unwrap();
        set.register(peer("pn", 2, ConnType::ProxyNode)).unwrap();
        set.register(peer("en", 3, ConnType::EndpointNode)).unwrap();
        let hash = Hash::new([5; 32]);
        set.peer("pn").unwrap().base().mark_transaction(hash);
        set.peer("cn").unwrap().base().mark_block(hash);

        let ids = |peers: Vec<Arc<dyn Peer>>| -> Vec<String> {
            peers.iter().map(|p| p.id().to_string()).collect()
        };
        assert_eq!(ids(set.peers_without_tx(&hash)), vec!["cn", "en"]);
        assert_eq!(ids(set.peers_without_block(&hash)), vec!["en", "pn"]);
        assert_eq!(
            ids(set.typed_peers_without_tx(ConnType::ProxyNode, &hash)),
            Vec::<String>::new()
        );
        assert_eq!(
            ids(set.another_type_peers_without_tx(ConnType::EndpointNode, &hash)),
            vec!["cn"]
        );
        assert_eq!(
            ids(set.another_type_peers_without_block(ConnType::ConsensusNode, &hash)),
            vec!["en", "pn"]
        );
        assert_eq!(ids(set.typed_peers(ConnType::EndpointNode)), vec!["en"]);
    }
}
