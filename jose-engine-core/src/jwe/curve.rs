//! Elliptic curve Diffie-Hellman primitives.
//!
//! NIST curve scalar multiplication sits behind [`ScalarMultiplier`] with two
//! implementations that must agree bit for bit:
//! - [`NativeMultiplier`] uses the constant-time arithmetic of the `p256`,
//!   `p384` and `p521` crates
//! - [`SoftwareMultiplier`] uses affine double-and-add over big integers
//!
//! X25519 always goes through `x25519-dalek`.
//!
//! # Security Considerations
//!
//! - Public points are checked to lie on the curve before any multiplication
//! - Both keys must name the same curve
//! - Identity results and non-contributory X25519 outputs are rejected

use std::fmt;
use std::sync::Arc;

use rsa::BigUint;
use zeroize::Zeroizing;

use crate::config::CurveBackend;
use crate::error::{Error, Result};
use crate::key::{Curve, Key};

/// An affine curve point as big-endian coordinates of the curve's field size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcPoint {
    /// The x coordinate
    pub x: Vec<u8>,
    /// The y coordinate
    pub y: Vec<u8>,
}

/// Multiplies a point on a NIST curve by a scalar.
pub trait ScalarMultiplier: Send + Sync + fmt::Debug {
    /// Computes `scalar · point` on `curve`.
    ///
    /// # Errors
    ///
    /// * `Error::Cryptographic` - If the point is not on the curve, the
    ///   scalar is invalid or the result is the point at infinity
    fn multiply(&self, curve: Curve, scalar: &[u8], point: &EcPoint) -> Result<EcPoint>;
}

/// Returns the multiplier for a configured backend.
#[must_use]
pub fn multiplier_for(backend: CurveBackend) -> Arc<dyn ScalarMultiplier> {
    match backend {
        CurveBackend::Native => Arc::new(NativeMultiplier),
        CurveBackend::Software => Arc::new(SoftwareMultiplier),
    }
}

/// Scalar multiplication through the RustCrypto curve crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeMultiplier;

macro_rules! native_multiply {
    ($curve:ident, $scalar:expr, $point:expr) => {{
        use $curve::elliptic_curve::group::Curve as _;
        use $curve::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};

        let encoded = $curve::EncodedPoint::from_affine_coordinates(
            $curve::FieldBytes::from_slice(&$point.x),
            $curve::FieldBytes::from_slice(&$point.y),
            false,
        );
        let public = Option::<$curve::PublicKey>::from($curve::PublicKey::from_encoded_point(
            &encoded,
        ))
        .ok_or(Error::Cryptographic)?;
        let secret = $curve::SecretKey::from_slice($scalar).map_err(|_| Error::Cryptographic)?;
        let product = (public.to_projective() * *secret.to_nonzero_scalar()).to_affine();
        let product = product.to_encoded_point(false);
        match (product.x(), product.y()) {
            (Some(x), Some(y)) => Ok(EcPoint {
                x: x.to_vec(),
                y: y.to_vec(),
            }),
            _ => Err(Error::Cryptographic),
        }
    }};
}

impl ScalarMultiplier for NativeMultiplier {
    fn multiply(&self, curve: Curve, scalar: &[u8], point: &EcPoint) -> Result<EcPoint> {
        check_lengths(curve, scalar, point)?;
        match curve {
            Curve::P256 => native_multiply!(p256, scalar, point),
            Curve::P384 => native_multiply!(p384, scalar, point),
            Curve::P521 => native_multiply!(p521, scalar, point),
            Curve::X25519 | Curve::Ed25519 => Err(Error::Cryptographic),
        }
    }
}

/// Affine double-and-add over `rsa::BigUint`.
///
/// Not constant time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareMultiplier;

/// Short Weierstrass parameters with `a = p - 3` and group order `n`.
struct CurveParams {
    p: BigUint,
    a: BigUint,
    b: BigUint,
    n: BigUint,
    size: usize,
}

impl CurveParams {
    fn for_curve(curve: Curve) -> Result<Self> {
        let (p, b, n) = match curve {
            Curve::P256 => (
                "FFFFFFFF00000001000000000000000000000000FFFFFFFFFFFFFFFFFFFFFFFF",
                "5AC635D8AA3A93E7B3EBBD55769886BC651D06B0CC53B0F63BCE3C3E27D2604B",
                "FFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551",
            ),
            Curve::P384 => (
                "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFE\
                 FFFFFFFF0000000000000000FFFFFFFF",
                "B3312FA7E23EE7E4988E056BE3F82D19181D9C6EFE8141120314088F5013875A\
                 C656398D8A2ED19D2A85C8EDD3EC2AEF",
                "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFC7634D81F4372DDF\
                 581A0DB248B0A77AECEC196ACCC52973",
            ),
            Curve::P521 => (
                "01FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF\
                 FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF",
                "0051953EB9618E1C9A1F929A21A0B68540EEA2DA725B99B315F3B8B489918EF1\
                 09E156193951EC7E937B1652C0BD3BB1BF073573DF883D2C34F1EF451FD46B50\
                 3F00",
                "01FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF\
                 FA51868783BF2F966B7FCC0148F709A5D03BB5C9B8899C47AEBB6FB71E91386409",
            ),
            Curve::X25519 | Curve::Ed25519 => return Err(Error::Cryptographic),
        };
        let parse = |hex: &str| BigUint::parse_bytes(hex.as_bytes(), 16).ok_or(Error::Cryptographic);
        let p = parse(p)?;
        let a = &p - BigUint::from(3u32);
        Ok(Self {
            a,
            b: parse(b)?,
            n: parse(n)?,
            p,
            size: curve.coordinate_size(),
        })
    }

    fn sub(&self, x: &BigUint, y: &BigUint) -> BigUint {
        ((x + &self.p) - y) % &self.p
    }

    fn mul(&self, x: &BigUint, y: &BigUint) -> BigUint {
        (x * y) % &self.p
    }

    /// Inverse by Fermat's little theorem; `p` is prime.
    fn inv(&self, x: &BigUint) -> BigUint {
        x.modpow(&(&self.p - BigUint::from(2u32)), &self.p)
    }

    /// A private scalar must satisfy `0 < k < n`; it is never reduced.
    fn is_valid_scalar(&self, k: &BigUint) -> bool {
        k != &BigUint::from(0u32) && k < &self.n
    }

    fn is_on_curve(&self, x: &BigUint, y: &BigUint) -> bool {
        if x >= &self.p || y >= &self.p {
            return false;
        }
        let lhs = self.mul(y, y);
        let rhs = (self.mul(&self.mul(x, x), x) + self.mul(&self.a, x) + &self.b) % &self.p;
        lhs == rhs
    }

    fn double(&self, point: Option<(BigUint, BigUint)>) -> Option<(BigUint, BigUint)> {
        let (x, y) = point?;
        if y == BigUint::from(0u32) {
            return None;
        }
        let numerator = (self.mul(&BigUint::from(3u32), &self.mul(&x, &x)) + &self.a) % &self.p;
        let lambda = self.mul(&numerator, &self.inv(&self.mul(&BigUint::from(2u32), &y)));
        let x3 = self.sub(&self.sub(&self.mul(&lambda, &lambda), &x), &x);
        let y3 = self.sub(&self.mul(&lambda, &self.sub(&x, &x3)), &y);
        Some((x3, y3))
    }

    fn add(
        &self,
        left: Option<(BigUint, BigUint)>,
        right: &(BigUint, BigUint),
    ) -> Option<(BigUint, BigUint)> {
        let Some((x1, y1)) = left else {
            return Some(right.clone());
        };
        let (x2, y2) = right;
        if &x1 == x2 {
            if (&y1 + y2) % &self.p == BigUint::from(0u32) {
                return None;
            }
            return self.double(Some((x1, y1)));
        }
        let lambda = self.mul(&self.sub(y2, &y1), &self.inv(&self.sub(x2, &x1)));
        let x3 = self.sub(&self.sub(&self.mul(&lambda, &lambda), &x1), x2);
        let y3 = self.sub(&self.mul(&lambda, &self.sub(&x1, &x3)), &y1);
        Some((x3, y3))
    }

    fn encode(&self, value: &BigUint) -> Vec<u8> {
        let bytes = value.to_bytes_be();
        let mut out = vec![0u8; self.size.saturating_sub(bytes.len())];
        out.extend_from_slice(&bytes);
        out
    }
}

impl ScalarMultiplier for SoftwareMultiplier {
    fn multiply(&self, curve: Curve, scalar: &[u8], point: &EcPoint) -> Result<EcPoint> {
        check_lengths(curve, scalar, point)?;
        let params = CurveParams::for_curve(curve)?;
        let base = (
            BigUint::from_bytes_be(&point.x),
            BigUint::from_bytes_be(&point.y),
        );
        let k = BigUint::from_bytes_be(scalar);
        if !params.is_on_curve(&base.0, &base.1) || !params.is_valid_scalar(&k) {
            return Err(Error::Cryptographic);
        }

        let mut result = None;
        for &byte in scalar {
            for bit in (0..8).rev() {
                result = params.double(result);
                if (byte >> bit) & 1 == 1 {
                    result = params.add(result, &base);
                }
            }
        }

        let (x, y) = result.ok_or(Error::Cryptographic)?;
        Ok(EcPoint {
            x: params.encode(&x),
            y: params.encode(&y),
        })
    }
}

fn check_lengths(curve: Curve, scalar: &[u8], point: &EcPoint) -> Result<()> {
    let size = curve.coordinate_size();
    if scalar.len() != size || point.x.len() != size || point.y.len() != size {
        return Err(Error::Cryptographic);
    }
    Ok(())
}

/// Computes the raw ECDH shared secret between a private and a public key.
///
/// For NIST curves this is the x coordinate of `d · Q`; for X25519 it is
/// the X25519 function output.
///
/// # Errors
///
/// * `Error::KeyFormat` - If either key is malformed, lacks `d`, or uses a
///   curve that does not support key agreement
/// * `Error::Cryptographic` - If the curves differ or the computation fails
pub fn shared_secret(
    multiplier: &dyn ScalarMultiplier,
    private_key: &Key,
    public_key: &Key,
) -> Result<Zeroizing<Vec<u8>>> {
    let curve = private_key.curve()?;
    let peer_curve = public_key.curve()?;
    if curve == Curve::Ed25519 {
        return Err(Error::key_format("Ed25519 keys cannot be used for key agreement"));
    }
    if curve != peer_curve {
        return Err(Error::Cryptographic);
    }

    let size = curve.coordinate_size();
    let d = private_key.decode("d")?;
    let x = public_key.decode("x")?;
    if d.len() != size || x.len() != size {
        return Err(Error::key_format(format!(
            "{} coordinates must be {size} bytes",
            curve.name()
        )));
    }

    if curve == Curve::X25519 {
        return x25519_shared_secret(&d, &x);
    }

    let y = public_key.decode("y")?;
    if y.len() != size {
        return Err(Error::key_format(format!(
            "{} coordinates must be {size} bytes",
            curve.name()
        )));
    }
    let point = EcPoint {
        x: x.to_vec(),
        y: y.to_vec(),
    };
    let product = multiplier.multiply(curve, &d, &point)?;
    Ok(Zeroizing::new(product.x))
}

fn x25519_shared_secret(d: &[u8], x: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut scalar = Zeroizing::new([0u8; 32]);
    scalar.copy_from_slice(d);
    let mut peer = [0u8; 32];
    peer.copy_from_slice(x);

    let secret = x25519_dalek::StaticSecret::from(*scalar);
    let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
    if !shared.was_contributory() {
        return Err(Error::Cryptographic);
    }
    Ok(Zeroizing::new(shared.as_bytes().to_vec()))
}
