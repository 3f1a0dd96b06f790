use super::*;

impl Dispatcher {
    /// Fragment handling for locally destined bundles: accumulate parts
    /// under `ReassemblyPending` until they cover the whole original data
    /// unit, then deliver the reassembled bundle.
    pub(super) async fn reassemble(&self, mut pack: BundlePack) {
        pack.state.add(Constraint::ReassemblyPending);
        if let Err(e) = pack.sync(&self.store) {
            error!("failed to sync {pack}: {e}");
            return;
        }

        let item = match self.store.query_id(&pack.id.to_string()) {
            Ok(item) => item,
            Err(e) => {
                error!("lost bundle {} during reassembly: {e}", pack.id);
                return;
            }
        };

        let mut parts = item.parts.clone();
        parts.sort_by_key(|p| p.fragment_offset);
        let Some(total_len) = parts.first().map(|p| p.total_data_length) else {
            return;
        };

        // load fragments and check contiguous coverage of [0, total_len)
        let mut fragments = Vec::with_capacity(parts.len());
        let mut covered = 0u64;
        for part in &parts {
            let bundle = match self.store.load(part).await {
                Ok(bundle) => bundle,
                Err(e) => {
                    warn!("failed to load fragment of {}: {e}", pack.id);
                    return;
                }
            };
            let payload_len = bundle.payload().map_or(0, |p| p.len()) as u64;

            if part.fragment_offset > covered {
                trace!(
                    "bundle {} still has a gap at offset {covered}",
                    pack.id
                );
                return;
            }
            covered = covered.max(part.fragment_offset + payload_len);
            fragments.push((part.fragment_offset, bundle));
        }
        if covered < total_len {
            trace!("bundle {} incomplete: {covered}/{total_len} bytes", pack.id);
            return;
        }

        // stitch the payload back together; overlaps are simply rewritten
        let mut payload = vec![0u8; total_len as usize];
        for (offset, fragment) in &fragments {
            let Some(data) = fragment.payload() else {
                continue;
            };
            let start = *offset as usize;
            let end = (start + data.len()).min(payload.len());
            payload[start..end].copy_from_slice(&data[..end - start]);
        }

        // the reassembled bundle inherits the first fragment's blocks
        let Some((_, mut bundle)) = fragments.into_iter().next() else {
            return;
        };
        bundle.primary.flags.is_fragment = false;
        bundle.primary.fragment_info = None;
        if let Some(b) = bundle.block_mut(bpv7::block::Type::Payload) {
            b.data = bpv7::block::Data::Payload(payload.into());
        }

        info!("reassembled bundle {} from {} parts", pack.id, parts.len());
        pack.state.remove(Constraint::ReassemblyPending);

        if self.agents.deliver(&bundle).await {
            pack.state.add(Constraint::LocalEndpoint);
            pack.state.purge_constraints();
        } else {
            debug!("no agent for reassembled bundle {}", pack.id);
            pack.state.add(Constraint::Contraindicated);
        }

        if let Err(e) = pack.sync(&self.store) {
            error!("failed to sync {pack}: {e}");
        }
    }
}
