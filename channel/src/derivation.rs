use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey, Signing, Verification};

use crate::error::Error;
use crate::tools::sha256;

fn tweak(a: &PublicKey, b: &PublicKey) -> Result<Scalar, Error> {
    let joined = [&a.serialize()[..], &b.serialize()[..]].concat();
    Scalar::from_be_bytes(sha256(&joined))
        .map_err(|_| Error::Crypto(bitcoin::secp256k1::Error::InvalidTweak))
}

// pubkey = basepoint + SHA256(per_state_point || basepoint) * G
pub fn derive_pubkey<C: Verification + Signing>(
    secp: &Secp256k1<C>,
    base_point: &PublicKey,
    per_state_point: &PublicKey,
) -> Result<PublicKey, Error> {
    let t = tweak(per_state_point, base_point)?;
    let sk = SecretKey::from_slice(&t.to_be_bytes())?;
    let pk = PublicKey::from_secret_key(secp, &sk);
    Ok(pk.combine(base_point)?)
}

// privkey = basepoint_secret + SHA256(per_state_point || basepoint)
pub fn derive_privkey<C: Signing>(
    secp: &Secp256k1<C>,
    base_secret: &SecretKey,
    per_state_point: &PublicKey,
) -> Result<SecretKey, Error> {
    let base_point = PublicKey::from_secret_key(secp, base_secret);
    let t = tweak(per_state_point, &base_point)?;
    Ok(base_secret.add_tweak(&t)?)
}

// revocation_pubkey = revocation_basepoint * SHA256(revocation_basepoint || per_state_point)
//      + per_state_point * SHA256(per_state_point || revocation_basepoint)
pub fn derive_revocation_pubkey<C: Verification>(
    secp: &Secp256k1<C>,
    revocation_base_point: &PublicKey,
    per_state_point: &PublicKey,
) -> Result<PublicKey, Error> {
    let t1 = tweak(revocation_base_point, per_state_point)?;
    let t2 = tweak(per_state_point, revocation_base_point)?;

    let pk1 = revocation_base_point.mul_tweak(secp, &t1)?;
    let pk2 = per_state_point.mul_tweak(secp, &t2)?;
    Ok(pk1.combine(&pk2)?)
}

// revocation_privkey = revocation_basepoint_secret * SHA256(revocation_basepoint || per_state_point)
//      + per_state_secret * SHA256(per_state_point || revocation_basepoint)
pub fn derive_revocation_privkey<C: Signing>(
    secp: &Secp256k1<C>,
    revocation_base_secret: &SecretKey,
    per_state_secret: &SecretKey,
) -> Result<SecretKey, Error> {
    let revocation_base_point = PublicKey::from_secret_key(secp, revocation_base_secret);
    let per_state_point = PublicKey::from_secret_key(secp, per_state_secret);

    let t1 = tweak(&revocation_base_point, &per_state_point)?;
    let t2 = tweak(&per_state_point, &revocation_base_point)?;

    let sk1 = revocation_base_secret.mul_tweak(&t1)?;
    let sk2 = per_state_secret.mul_tweak(&t2)?;
    let sk2_scalar = Scalar::from_be_bytes(sk2.secret_bytes())
        .map_err(|_| Error::Crypto(bitcoin::secp256k1::Error::InvalidTweak))?;
    Ok(sk1.add_tweak(&sk2_scalar)?)
}

/// The elkrem point for a state is simply secret * G: whoever holds the
/// revealed secret can reproduce the point committed earlier.
pub fn elk_point<C: Signing>(secp: &Secp256k1<C>, secret: &[u8; 32]) -> Result<PublicKey, Error> {
    let sk = SecretKey::from_slice(secret)?;
    Ok(PublicKey::from_secret_key(secp, &sk))
}
