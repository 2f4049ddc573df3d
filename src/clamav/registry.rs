// 回调上下文注册表
//
// libclamav 的回调只能带回一个 void* 上下文。我们不把调用方的对象地址直接交给
// C 代码，而是在注册表里登记对象，交出一个不透明的令牌；回调触发时再用令牌
// 查回对象。
//
// 令牌由槽位下标、注册表标签和代数编码而成（从低位到高位）：
// - 槽位下标 + 1（保证非零，不会和 NULL 上下文混淆）
// - 注册表标签：存活的注册表各占一个，其他注册表发出的指针查不到本表的对象
// - 槽位代数：释放后递增，旧令牌不会查到新对象
//
// 锁只在单次 map 操作期间持有，从不跨越原生调用。

use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::{ClamAVError, Result};

const INDEX_BITS: u32 = usize::BITS * 3 / 8;
const TAG_BITS: u32 = usize::BITS / 8;
const GENERATION_BITS: u32 = usize::BITS - INDEX_BITS - TAG_BITS;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
const TAG_MASK: usize = (1 << TAG_BITS) - 1;
const GENERATION_MASK: usize = (1 << GENERATION_BITS) - 1;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

// 存活注册表占用的标签，注册表析构时归还
static TAGS_IN_USE: Mutex<Vec<bool>> = Mutex::new(Vec::new());

fn claim_tag() -> usize {
    let mut tags = TAGS_IN_USE.lock().unwrap_or_else(PoisonError::into_inner);
    if tags.is_empty() {
        tags.resize(TAG_MASK + 1, false);
    }
    let Some(tag) = tags.iter().position(|used| !used) else {
        panic!("too many live context registries (limit {})", TAG_MASK + 1);
    };
    tags[tag] = true;
    tag
}

fn return_tag(tag: usize) {
    let mut tags = TAGS_IN_USE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(used) = tags.get_mut(tag) {
        *used = false;
    }
}

/// 注册表发出的不透明令牌
///
/// 不实现 Clone：持有令牌即拥有查询和释放对应上下文的能力。
pub struct ContextToken {
    registry: u64,
    raw: NonZeroUsize,
}

impl ContextToken {
    /// 传给原生调用的上下文指针；只作为键使用，从不解引用
    pub fn as_ptr(&self) -> *mut c_void {
        self.raw.get() as *mut c_void
    }

    fn index(&self) -> usize {
        decode(self.raw.get()).0
    }
}

impl fmt::Debug for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (index, tag, generation) = decode(self.raw.get());
        f.debug_struct("ContextToken")
            .field("registry", &self.registry)
            .field("tag", &tag)
            .field("index", &index)
            .field("generation", &generation)
            .finish()
    }
}

fn encode(index: usize, tag: usize, generation: u32) -> NonZeroUsize {
    let generation = (generation as usize) & GENERATION_MASK;
    let raw = (generation << (INDEX_BITS + TAG_BITS))
        | ((tag & TAG_MASK) << INDEX_BITS)
        | (index + 1);
    // index + 1 >= 1
    NonZeroUsize::new(raw).unwrap_or(NonZeroUsize::MIN)
}

/// 返回 (下标, 标签, 代数)；下标部分为 0 时下标为 usize::MAX（不可能命中）
fn decode(raw: usize) -> (usize, usize, usize) {
    let index = (raw & INDEX_MASK).wrapping_sub(1);
    let tag = (raw >> INDEX_BITS) & TAG_MASK;
    (index, tag, raw >> (INDEX_BITS + TAG_BITS))
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> Slot<T> {
    fn matches(&self, generation: usize) -> bool {
        self.value.is_some() && (self.generation as usize & GENERATION_MASK) == generation
    }
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<usize>,
    live: usize,
}

impl<T> Slots<T> {
    fn get(&self, raw: usize) -> Option<&T> {
        let (index, _, generation) = decode(raw);
        self.entries
            .get(index)
            .filter(|slot| slot.matches(generation))
            .and_then(|slot| slot.value.as_ref())
    }
}

/// 上下文注册表
///
/// 进程内可以有多个相互隔离的实例；引擎回调使用的全局实例见
/// [`scan_contexts`](super::callback::scan_contexts)。
pub struct ContextRegistry<T> {
    id: u64,
    tag: usize,
    slots: Mutex<Slots<T>>,
}

impl<T> ContextRegistry<T> {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            tag: claim_tag(),
            slots: Mutex::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    // 持锁期间不会执行调用方代码，中毒的锁里数据仍然一致
    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn owns(&self, raw: usize) -> bool {
        decode(raw).1 == self.tag
    }

    /// 登记上下文，返回令牌
    ///
    /// 令牌空间耗尽时 panic：没有稳定令牌，正在进行的原生调用无法安全继续。
    pub fn register(&self, payload: T) -> ContextToken {
        let mut slots = self.lock();

        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                let index = slots.entries.len();
                assert!(index < INDEX_MASK, "context registry exhausted");
                slots.entries.push(Slot {
                    generation: 0,
                    value: None,
                });
                index
            }
        };

        let slot = &mut slots.entries[index];
        slot.value = Some(payload);
        let raw = encode(index, self.tag, slot.generation);
        slots.live += 1;

        tracing::trace!("Registered context: registry={}, index={}", self.id, index);
        ContextToken {
            registry: self.id,
            raw,
        }
    }

    /// 释放令牌对应的上下文并归还槽位
    ///
    /// 令牌未登记、已释放或来自其他注册表时返回 ContextNotFound，不影响其他令牌。
    pub fn release(&self, token: &ContextToken) -> Result<T> {
        if token.registry != self.id {
            return Err(ClamAVError::ContextNotFound);
        }
        self.release_raw(token.raw.get())
    }

    fn release_raw(&self, raw: usize) -> Result<T> {
        if !self.owns(raw) {
            return Err(ClamAVError::ContextNotFound);
        }
        let (index, _, generation) = decode(raw);
        let mut slots = self.lock();

        let value = match slots.entries.get_mut(index) {
            Some(slot) if slot.matches(generation) => {
                slot.generation = slot.generation.wrapping_add(1);
                slot.value.take()
            }
            _ => None,
        };

        match value {
            Some(value) => {
                slots.free.push(index);
                slots.live -= 1;
                tracing::trace!("Released context: registry={}, index={}", self.id, index);
                Ok(value)
            }
            None => Err(ClamAVError::ContextNotFound),
        }
    }

    /// 当前登记的上下文数量；空闲时应为 0
    pub fn len(&self) -> usize {
        self.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 登记上下文并返回作用域守卫，守卫析构时自动释放
    pub fn guard(&self, payload: T) -> ContextGuard<'_, T> {
        let token = self.register(payload);
        ContextGuard {
            registry: self,
            token,
        }
    }
}

impl<T: Clone> ContextRegistry<T> {
    /// 查询令牌对应的上下文；找不到时返回 None
    pub fn lookup(&self, token: &ContextToken) -> Option<T> {
        if token.registry != self.id {
            return None;
        }
        self.lock().get(token.raw.get()).cloned()
    }

    /// 用原生回调带回来的指针查询上下文
    ///
    /// NULL 或者由其他存活注册表发出的值返回 None。标签在注册表析构后会被
    /// 复用，所以指针不能比发出它的注册表活得更久。
    pub fn lookup_raw(&self, context: *mut c_void) -> Option<T> {
        let raw = context as usize;
        if context.is_null() || !self.owns(raw) {
            return None;
        }
        self.lock().get(raw).cloned()
    }
}

impl<T> Default for ContextRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ContextRegistry<T> {
    fn drop(&mut self) {
        return_tag(self.tag);
    }
}

impl<T> fmt::Debug for ContextRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("live", &self.len())
            .finish()
    }
}

/// 作用域内持有的上下文令牌
///
/// 在原生调用入口创建，任何退出路径（成功、检测到病毒、出错、提前返回）
/// 都会在析构时释放。
pub struct ContextGuard<'a, T> {
    registry: &'a ContextRegistry<T>,
    token: ContextToken,
}

impl<T> ContextGuard<'_, T> {
    pub fn token(&self) -> &ContextToken {
        &self.token
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.token.as_ptr()
    }
}

impl<T> Drop for ContextGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.registry.release(&self.token) {
            tracing::warn!("Context release failed for slot {}: {}", self.token.index(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_register_lookup_release() {
        let registry = ContextRegistry::new();
        let token = registry.register("payload".to_string());

        assert_eq!(registry.lookup(&token), Some("payload".to_string()));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.release(&token).unwrap(), "payload");
        assert_eq!(registry.lookup(&token), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_double_release_reports_nothing_to_release() {
        let registry = ContextRegistry::new();
        let token = registry.register(1u32);
        let other = registry.register(2u32);

        registry.release(&token).unwrap();
        let err = registry.release(&token).unwrap_err();
        assert!(matches!(err, ClamAVError::ContextNotFound));
        assert_eq!(err.to_string(), "no context to delete");

        // 其他令牌不受影响
        assert_eq!(registry.lookup(&other), Some(2));
        registry.release(&other).unwrap();
    }

    #[test]
    fn test_stale_token_does_not_see_reused_slot() {
        let registry = ContextRegistry::new();
        let old = registry.register(10u32);
        registry.release(&old).unwrap();

        let new = registry.register(20u32);
        assert_eq!(old.index(), new.index());
        assert_ne!(old.as_ptr(), new.as_ptr());

        assert_eq!(registry.lookup(&old), None);
        assert_eq!(registry.lookup_raw(old.as_ptr()), None);
        assert!(registry.release(&old).is_err());
        assert_eq!(registry.lookup(&new), Some(20));
    }

    #[test]
    fn test_foreign_token_rejected() {
        let a = ContextRegistry::new();
        let b = ContextRegistry::new();
        let token_a = a.register("a");
        let token_b = b.register("b");

        assert_eq!(a.lookup(&token_b), None);
        assert!(matches!(a.release(&token_b), Err(ClamAVError::ContextNotFound)));
        assert_eq!(b.lookup(&token_b), Some("b"));
        assert_eq!(a.lookup(&token_a), Some("a"));
    }

    #[test]
    fn test_foreign_pointer_rejected() {
        let a = ContextRegistry::new();
        let b = ContextRegistry::new();
        let token_a = a.register("payload-of-a");
        let token_b = b.register("payload-of-b");

        // 两个令牌的槽位和代数相同，只有标签不同
        assert_eq!(token_a.index(), token_b.index());
        assert_ne!(token_a.as_ptr(), token_b.as_ptr());

        assert_eq!(a.lookup_raw(token_b.as_ptr()), None);
        assert_eq!(b.lookup_raw(token_a.as_ptr()), None);
        assert_eq!(a.lookup_raw(token_a.as_ptr()), Some("payload-of-a"));
        assert_eq!(b.lookup_raw(token_b.as_ptr()), Some("payload-of-b"));
    }

    #[test]
    fn test_dropped_registry_returns_tag() {
        for _ in 0..(TAG_MASK + 1) * 2 {
            let registry = ContextRegistry::new();
            let token = registry.register(1u8);
            assert_eq!(registry.lookup_raw(token.as_ptr()), Some(1));
        }
    }

    #[test]
    fn test_token_encoding_round_trip() {
        let raw = encode(INDEX_MASK - 1, TAG_MASK, u32::MAX);
        let (index, tag, generation) = decode(raw.get());
        assert_eq!(index, INDEX_MASK - 1);
        assert_eq!(tag, TAG_MASK);
        assert_eq!(generation, (u32::MAX as usize) & GENERATION_MASK);
    }

    #[test]
    fn test_lookup_raw() {
        let registry = ContextRegistry::new();
        let token = registry.register(7i64);

        assert_eq!(registry.lookup_raw(token.as_ptr()), Some(7));
        assert_eq!(registry.lookup_raw(std::ptr::null_mut()), None);
        assert_eq!(registry.lookup_raw(0x7fff_0000usize as *mut c_void), None);
        assert!(!token.as_ptr().is_null());
    }

    #[test]
    fn test_guard_releases_on_error_path() {
        fn scan_with_context(registry: &ContextRegistry<u8>, fail: bool) -> Result<u8> {
            let guard = registry.guard(5);
            let value = registry.lookup(guard.token()).ok_or(ClamAVError::ContextNotFound)?;
            if fail {
                return Err(ClamAVError::Config("native call failed".into()));
            }
            Ok(value)
        }

        let registry = ContextRegistry::new();
        assert_eq!(scan_with_context(&registry, false).unwrap(), 5);
        assert!(registry.is_empty());
        assert!(scan_with_context(&registry, true).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(ContextRegistry::new());

        let handles: Vec<_> = (0..16usize)
            .map(|n| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let tokens: Vec<_> = (0..64usize)
                        .map(|i| {
                            let payload = n * 1000 + i;
                            (payload, registry.register(payload))
                        })
                        .collect();
                    for (expected, token) in &tokens {
                        assert_eq!(registry.lookup(token), Some(*expected));
                    }
                    for (expected, token) in &tokens {
                        assert_eq!(registry.release(token).unwrap(), *expected);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_live_tokens_are_distinct() {
        let registry = ContextRegistry::new();
        let tokens: Vec<_> = (0..100u32).map(|i| registry.register(i)).collect();

        let mut raw: Vec<usize> = tokens.iter().map(|t| t.as_ptr() as usize).collect();
        raw.sort_unstable();
        raw.dedup();
        assert_eq!(raw.len(), 100);

        for (i, token) in tokens.iter().enumerate() {
            assert_eq!(registry.lookup(token), Some(i as u32));
        }
        for token in &tokens {
            registry.release(token).unwrap();
        }
        assert!(registry.is_empty());
    }
}
